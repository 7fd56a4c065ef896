//! AWAITING_PLATFORM_SELECTION: the gate before planning
//!
//! Decisions already queued are applied first. While the decision channel
//! is open the run then waits, with no timeout, for every file that lacks a
//! platform to be assigned or discarded and for every held duplicate to be
//! forced or discarded. No batch starts while anything is pending. A closed
//! decision channel releases the gate: files still waiting are reported as
//! needing a platform and held duplicates are skipped.

use super::{DecisionReceiver, PipelineOrchestrator, RunContext, UserDecision};
use romhold_common::events::{CandidateId, CandidateStatus, PendingSelection, PipelineEvent, RunState};

impl PipelineOrchestrator {
    pub(super) async fn phase_selection(&self, run: &mut RunContext, decisions: &mut DecisionReceiver) {
        while let Ok(decision) = decisions.rx.try_recv() {
            self.apply_decision(run, decision);
        }

        let mut announced: Vec<CandidateId> = Vec::new();
        let mut waiting = false;

        loop {
            let pending = run.ids_with_status(CandidateStatus::NeedsPlatformSelection);
            let held = run.ids_with_status(CandidateStatus::Duplicate);
            if pending.is_empty() && held.is_empty() {
                break;
            }

            if !waiting && !pending.is_empty() {
                run.transition(RunState::AwaitingPlatformSelection);
                waiting = true;
            }

            if !pending.is_empty() && pending != announced {
                let selections: Vec<PendingSelection> = pending
                    .iter()
                    .map(|id| {
                        let mut selection = run.candidates[id.0].pending_selection();
                        // Unknown extension: any platform in the snapshot may apply
                        if selection.possible_platforms.is_empty() {
                            selection.possible_platforms = run.detector.index().options();
                        }
                        selection
                    })
                    .collect();
                tracing::info!(
                    run_id = %run.run_id(),
                    pending = selections.len(),
                    "Waiting for platform selection"
                );
                run.emit(PipelineEvent::AwaitingPlatformSelection {
                    run_id: run.run_id(),
                    pending: selections,
                });
                announced = pending.clone();
            }

            if !held.is_empty() {
                tracing::debug!(
                    run_id = %run.run_id(),
                    held = held.len(),
                    "Waiting for duplicate confirmation"
                );
            }

            let next = tokio::select! {
                _ = run.cancel.cancelled() => {
                    tracing::info!(run_id = %run.run_id(), "Run cancelled while awaiting selection");
                    return;
                }
                decision = decisions.rx.recv() => decision,
            };

            match next {
                Some(decision) => self.apply_decision(run, decision),
                None => {
                    if !pending.is_empty() {
                        tracing::warn!(
                            run_id = %run.run_id(),
                            unresolved = pending.len(),
                            "Decision channel closed, continuing without unresolved files"
                        );
                    }
                    if !held.is_empty() {
                        tracing::info!(
                            run_id = %run.run_id(),
                            skipped = held.len(),
                            "Decision channel closed, skipping held duplicates"
                        );
                    }
                    break;
                }
            }
        }
    }

    /// Apply one user decision to the ledger
    ///
    /// Decisions that do not fit the candidate's current status are logged
    /// and ignored.
    pub(super) fn apply_decision(&self, run: &mut RunContext, decision: UserDecision) {
        let id = match &decision {
            UserDecision::AssignPlatform { candidate, .. }
            | UserDecision::ForceDuplicate { candidate }
            | UserDecision::Discard { candidate } => *candidate,
        };

        let Some(status) = run.candidates.get(id.0).map(|c| c.status) else {
            tracing::warn!(candidate = %id, "Decision for unknown candidate ignored");
            return;
        };

        match decision {
            UserDecision::AssignPlatform { platform_id, .. } => {
                if let Err(e) = run.detector.validate_choice(platform_id) {
                    tracing::warn!(candidate = %id, platform_id, error = %e, "Platform choice rejected");
                    return;
                }
                match status {
                    CandidateStatus::NeedsPlatformSelection | CandidateStatus::Ready => {
                        run.candidates[id.0].resolved_platform_id = Some(platform_id);
                        tracing::info!(candidate = %id, platform_id, "Platform assigned");
                        run.set_status(id, CandidateStatus::Ready, None);
                    }
                    CandidateStatus::Duplicate => {
                        // Used if the duplicate is later forced through
                        run.candidates[id.0].resolved_platform_id = Some(platform_id);
                        tracing::debug!(candidate = %id, platform_id, "Platform preset for held duplicate");
                    }
                    other => {
                        tracing::warn!(candidate = %id, status = %other, "Platform assignment ignored");
                    }
                }
            }
            UserDecision::ForceDuplicate { .. } => {
                if status != CandidateStatus::Duplicate {
                    tracing::debug!(candidate = %id, status = %status, "Force ignored, not a duplicate");
                    return;
                }
                run.candidates[id.0].duplicate_override = true;
                tracing::info!(candidate = %id, "Duplicate forced through by user");
                // Validation and hashing are not repeated, detection is
                self.resolve_platform(run, id);
            }
            UserDecision::Discard { .. } => {
                if status.is_terminal() {
                    tracing::debug!(candidate = %id, status = %status, "Discard ignored, already terminal");
                    return;
                }
                tracing::info!(candidate = %id, "File discarded by user");
                run.set_status(id, CandidateStatus::Discarded, None);
            }
        }
    }
}
