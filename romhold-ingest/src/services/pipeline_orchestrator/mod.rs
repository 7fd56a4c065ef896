//! Ingest pipeline orchestrator
//!
//! Composition root for one upload run. Each run state is handled by a
//! dedicated `phase_*` method:
//!
//! - **VALIDATING** (`phase_validation`): size/extension gate
//! - **HASHING_AND_DEDUP** (`phase_intake`): fingerprint, duplicate oracle,
//!   platform detection; files overlap via `buffer_unordered`
//! - **AWAITING_PLATFORM_SELECTION** (`phase_selection`): applies user
//!   decisions until every surviving file has a platform and every held
//!   duplicate is forced or discarded
//! - **PLANNING / UPLOADING / AGGREGATING** (`phase_upload`): per-platform
//!   batches submitted concurrently, results merged by the aggregator
//!
//! The candidate ledger lives in a [`RunContext`] owned by the task that
//! called [`PipelineOrchestrator::run`]. Concurrent work (hashing, oracle
//! calls, uploads) returns outcomes to that task, which alone applies them.

use crate::clients::{BatchUploader, DuplicateOracle, PlatformRegistry};
use crate::models::{
    PipelineRunResult, PipelineSession, PlatformExtensionIndex, RomFile, UploadCandidate,
};
use crate::services::{ContentHasher, FileValidator, PlatformDetector, UploadPlanner};
use chrono::Utc;
use romhold_common::events::{CandidateId, CandidateStatus, EventBus, PipelineEvent, RunState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

mod phase_intake;
mod phase_selection;
mod phase_upload;
mod phase_validation;

/// Failure message for work the run never got to because it was cancelled
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Runtime knobs for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Files hashed and checked concurrently
    pub hash_concurrency: usize,
    /// Batches uploading at once; 0 means all at once
    pub max_concurrent_batches: usize,
    /// Minimum spacing between progress events (final 100% always sent)
    pub progress_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            hash_concurrency: 4,
            max_concurrent_batches: 0,
            progress_interval: Duration::from_millis(250),
        }
    }
}

/// A user's answer to something the run is holding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserDecision {
    /// Resolve a file's platform explicitly
    AssignPlatform { candidate: CandidateId, platform_id: i64 },
    /// Upload a file even though matching content exists
    ForceDuplicate { candidate: CandidateId },
    /// Drop a held file from the run
    Discard { candidate: CandidateId },
}

/// Caller's handle for sending decisions into a run
#[derive(Debug, Clone)]
pub struct RunControls {
    tx: mpsc::UnboundedSender<UserDecision>,
}

impl RunControls {
    /// Queue a decision; returns `false` once the run stopped listening
    pub fn send(&self, decision: UserDecision) -> bool {
        self.tx.send(decision).is_ok()
    }

    pub fn assign_platform(&self, candidate: CandidateId, platform_id: i64) -> bool {
        self.send(UserDecision::AssignPlatform { candidate, platform_id })
    }

    pub fn force_duplicate(&self, candidate: CandidateId) -> bool {
        self.send(UserDecision::ForceDuplicate { candidate })
    }

    pub fn discard(&self, candidate: CandidateId) -> bool {
        self.send(UserDecision::Discard { candidate })
    }
}

/// Run side of the decision channel
#[derive(Debug)]
pub struct DecisionReceiver {
    rx: mpsc::UnboundedReceiver<UserDecision>,
}

/// Create a decision channel for one run
///
/// Dropping every [`RunControls`] tells the run no more answers are coming.
pub fn decision_channel() -> (RunControls, DecisionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RunControls { tx }, DecisionReceiver { rx })
}

/// Per-run mutable state, owned by the orchestrating task
pub(crate) struct RunContext {
    pub(crate) session: PipelineSession,
    pub(crate) candidates: Vec<UploadCandidate>,
    pub(crate) detector: PlatformDetector,
    pub(crate) cancel: CancellationToken,
    event_bus: EventBus,
}

impl RunContext {
    pub(crate) fn run_id(&self) -> Uuid {
        self.session.run_id
    }

    /// Emit an event unless the run was cancelled
    pub(crate) fn emit(&self, event: PipelineEvent) {
        if !self.cancel.is_cancelled() {
            self.event_bus.emit_lossy(event);
        }
    }

    pub(crate) fn transition(&mut self, new_state: RunState) {
        let transition = self.session.transition_to(new_state);
        tracing::debug!(
            run_id = %transition.run_id,
            old_state = ?transition.old_state,
            new_state = ?transition.new_state,
            "Run state changed"
        );
        self.emit(PipelineEvent::StateChanged {
            run_id: transition.run_id,
            old_state: transition.old_state,
            new_state: transition.new_state,
            timestamp: transition.transitioned_at,
        });
    }

    /// Set a candidate's status and error, announcing the change
    pub(crate) fn set_status(&mut self, id: CandidateId, status: CandidateStatus, error: Option<String>) {
        let Some(candidate) = self.candidates.get_mut(id.0) else {
            tracing::warn!(candidate = %id, "Status update for unknown candidate ignored");
            return;
        };
        candidate.status = status;
        candidate.error = error;
        let event = PipelineEvent::CandidateUpdated {
            run_id: self.session.run_id,
            candidate: id,
            file_name: candidate.file.name.clone(),
            status,
            error: candidate.error.clone(),
        };
        self.emit(event);
    }

    /// Fail every file a cancelled run left mid-flight
    ///
    /// Held files (duplicates, files waiting for a platform) keep their
    /// status so they are reported as held, not failed.
    pub(crate) fn settle_cancelled(&mut self) {
        let interrupted: Vec<CandidateId> = self
            .candidates
            .iter()
            .filter(|c| {
                !c.status.is_terminal()
                    && !matches!(
                        c.status,
                        CandidateStatus::Duplicate | CandidateStatus::NeedsPlatformSelection
                    )
            })
            .map(|c| c.id)
            .collect();

        if !interrupted.is_empty() {
            tracing::info!(
                run_id = %self.run_id(),
                files = interrupted.len(),
                "Run cancelled, marking unfinished files as failed"
            );
        }
        for id in interrupted {
            self.set_status(id, CandidateStatus::Failed, Some(CANCELLED_MESSAGE.to_string()));
        }
    }

    pub(crate) fn ids_with_status(&self, status: CandidateStatus) -> Vec<CandidateId> {
        self.candidates
            .iter()
            .filter(|c| c.status == status)
            .map(|c| c.id)
            .collect()
    }
}

/// Ingest pipeline orchestrator service
pub struct PipelineOrchestrator {
    validator: FileValidator,
    hasher: ContentHasher,
    oracle: Arc<dyn DuplicateOracle>,
    registry: Arc<dyn PlatformRegistry>,
    uploader: Arc<dyn BatchUploader>,
    planner: UploadPlanner,
    event_bus: EventBus,
    options: OrchestratorOptions,
}

impl PipelineOrchestrator {
    pub fn new(
        validator: FileValidator,
        hasher: ContentHasher,
        oracle: Arc<dyn DuplicateOracle>,
        registry: Arc<dyn PlatformRegistry>,
        uploader: Arc<dyn BatchUploader>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            validator,
            hasher,
            oracle,
            registry,
            uploader,
            planner: UploadPlanner::new(),
            event_bus: EventBus::default(),
            options,
        }
    }

    /// Replace the event bus (to share one across orchestrators)
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Run the pipeline over a file set
    ///
    /// Never fails: every per-file or per-batch problem is recorded on the
    /// candidate and counted in the result. Cancelling `cancel_token` stops
    /// batches that have not started and silences further events; requests
    /// already in flight still report back.
    pub async fn run(
        &self,
        files: Vec<RomFile>,
        decisions: DecisionReceiver,
        cancel_token: CancellationToken,
    ) -> PipelineRunResult {
        let session = PipelineSession::new();
        let started_at = session.started_at;
        let run_id = session.run_id;

        tracing::info!(run_id = %run_id, files = files.len(), "Starting ingest run");

        self.event_bus.emit_lossy(PipelineEvent::RunStarted {
            run_id,
            file_count: files.len(),
            timestamp: Utc::now(),
        });

        let candidates = files
            .into_iter()
            .enumerate()
            .map(|(i, file)| UploadCandidate::new(CandidateId(i), file))
            .collect();

        let mut run = RunContext {
            session,
            candidates,
            detector: PlatformDetector::new(self.snapshot_registry(run_id).await),
            cancel: cancel_token,
            event_bus: self.event_bus.clone(),
        };

        self.execute(&mut run, decisions).await;

        let cancelled = run.cancel.is_cancelled();
        if cancelled {
            run.settle_cancelled();
        }
        run.transition(if cancelled { RunState::Cancelled } else { RunState::Done });

        let result = PipelineRunResult::from_candidates(run_id, run.candidates, cancelled, started_at);

        tracing::info!(
            run_id = %run_id,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped_as_duplicate = result.skipped_as_duplicate,
            invalid = result.invalid,
            needs_platform_selection = result.needs_platform_selection,
            cancelled,
            duration_ms = result.duration_ms(),
            "Ingest run finished"
        );

        if !cancelled {
            self.event_bus.emit_lossy(PipelineEvent::RunCompleted {
                run_id,
                summary: result.summary(),
                timestamp: Utc::now(),
            });
        }

        result
    }

    /// Run with no decision source: duplicates are skipped and ambiguous
    /// files are reported as needing a platform
    pub async fn run_unattended(&self, files: Vec<RomFile>) -> PipelineRunResult {
        let (_, decisions) = decision_channel();
        self.run(files, decisions, CancellationToken::new()).await
    }

    async fn execute(&self, run: &mut RunContext, mut decisions: DecisionReceiver) {
        self.phase_validation(run);
        if run.cancel.is_cancelled() {
            return;
        }

        self.phase_intake(run).await;
        if run.cancel.is_cancelled() {
            return;
        }

        self.phase_selection(run, &mut decisions).await;
        if run.cancel.is_cancelled() {
            return;
        }

        self.phase_upload(run).await;
    }

    /// One registry snapshot per run; failure degrades to manual selection
    async fn snapshot_registry(&self, run_id: Uuid) -> Arc<PlatformExtensionIndex> {
        let platforms = match self.registry.list_active().await {
            Ok(platforms) => platforms,
            Err(e) => {
                tracing::warn!(
                    run_id = %run_id,
                    error = %e,
                    "Platform registry unavailable, every file will need manual selection"
                );
                Vec::new()
            }
        };
        Arc::new(PlatformExtensionIndex::build(&platforms))
    }
}
