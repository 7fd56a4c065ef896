//! HASHING_AND_DEDUP: fingerprint, ask the oracle, detect the platform
//!
//! Hashing is bounded by `hash_concurrency` via `buffer_unordered`; oracle
//! calls for finished fingerprints overlap in a `FuturesUnordered`. Per
//! file the order is strictly hash → check → detect.

use super::{PipelineOrchestrator, RunContext};
use crate::clients::DuplicateCheck;
use crate::error::NetworkError;
use crate::models::{Fingerprint, RomFile};
use futures::stream::{self, FuturesUnordered, StreamExt};
use romhold_common::events::{CandidateId, CandidateStatus, PipelineEvent, RunState};

enum IntakeStep {
    Hashed(CandidateId, Fingerprint),
    HashingDone,
    Checked(CandidateId, Result<DuplicateCheck, NetworkError>),
    Cancelled,
}

impl PipelineOrchestrator {
    /// Fingerprint and dedup every candidate that passed validation
    pub(super) async fn phase_intake(&self, run: &mut RunContext) {
        run.transition(RunState::HashingAndDedup);

        let pending = run.ids_with_status(CandidateStatus::Pending);
        let mut jobs: Vec<(CandidateId, RomFile)> = Vec::with_capacity(pending.len());
        for id in pending {
            run.set_status(id, CandidateStatus::Hashing, None);
            jobs.push((id, run.candidates[id.0].file.clone()));
        }

        let mut hashing = stream::iter(jobs)
            .map(|(id, file)| async move { (id, self.fingerprint(&file).await) })
            .buffer_unordered(self.options.hash_concurrency.max(1));
        let mut checks = FuturesUnordered::new();
        let mut hashing_done = false;

        loop {
            if hashing_done && checks.is_empty() {
                break;
            }

            let step = tokio::select! {
                _ = run.cancel.cancelled() => IntakeStep::Cancelled,
                item = hashing.next(), if !hashing_done => match item {
                    Some((id, fingerprint)) => IntakeStep::Hashed(id, fingerprint),
                    None => IntakeStep::HashingDone,
                },
                Some((id, result)) = checks.next(), if !checks.is_empty() => IntakeStep::Checked(id, result),
            };

            match step {
                IntakeStep::Cancelled => {
                    tracing::info!(run_id = %run.run_id(), "Run cancelled during hashing");
                    break;
                }
                IntakeStep::HashingDone => hashing_done = true,
                IntakeStep::Hashed(id, fingerprint) => {
                    let checkable = fingerprint.is_checkable();
                    let value = fingerprint.value.clone();
                    run.candidates[id.0].fingerprint = Some(fingerprint);

                    if checkable {
                        run.set_status(id, CandidateStatus::DuplicateCheck, None);
                        checks.push(async move { (id, self.oracle.check(&value).await) });
                    } else {
                        tracing::debug!(
                            candidate = %id,
                            "Content unreadable, skipping duplicate check"
                        );
                        self.resolve_platform(run, id);
                    }
                }
                IntakeStep::Checked(id, result) => self.apply_duplicate_check(run, id, result),
            }
        }
    }

    /// Hash a file, degrading to a metadata-only fingerprint
    async fn fingerprint(&self, file: &RomFile) -> Fingerprint {
        match self.hasher.hash(file).await {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "Using metadata-only fingerprint");
                self.hasher.metadata_fingerprint(file)
            }
        }
    }

    fn apply_duplicate_check(
        &self,
        run: &mut RunContext,
        id: CandidateId,
        result: Result<DuplicateCheck, NetworkError>,
    ) {
        match result {
            Ok(check) if check.is_duplicate => {
                let candidate = &mut run.candidates[id.0];
                candidate.duplicate_of = check.existing_record_ref.clone();
                let authoritative = candidate
                    .fingerprint
                    .as_ref()
                    .map(Fingerprint::is_authoritative)
                    .unwrap_or(false);
                let file_name = candidate.file.name.clone();

                tracing::info!(
                    run_id = %run.run_id(),
                    candidate = %id,
                    file = %file_name,
                    existing = ?check.existing_record_ref,
                    authoritative,
                    "Duplicate content detected, holding file"
                );

                run.set_status(id, CandidateStatus::Duplicate, None);
                run.emit(PipelineEvent::DuplicateDetected {
                    run_id: run.run_id(),
                    candidate: id,
                    file_name,
                    existing_record_ref: check.existing_record_ref,
                });
            }
            Ok(_) => self.resolve_platform(run, id),
            Err(e) => {
                tracing::warn!(
                    run_id = %run.run_id(),
                    candidate = %id,
                    error = %e,
                    "Duplicate check failed"
                );
                run.set_status(
                    id,
                    CandidateStatus::Failed,
                    Some(format!("Duplicate check failed: {}", e)),
                );
            }
        }
    }

    /// Detect a candidate's platform and mark it ready or waiting
    ///
    /// A platform the user already assigned is kept; detection still runs so
    /// the selection prompt can show the alternatives.
    pub(super) fn resolve_platform(&self, run: &mut RunContext, id: CandidateId) {
        let detection = run.detector.detect(&run.candidates[id.0].file.name);
        let resolved = run.detector.resolve(&detection);

        let candidate = &mut run.candidates[id.0];
        candidate.detection = Some(detection);

        if candidate.resolved_platform_id.is_some() {
            run.set_status(id, CandidateStatus::Ready, None);
            return;
        }

        match resolved {
            Ok(platform_id) => {
                candidate.resolved_platform_id = Some(platform_id);
                run.set_status(id, CandidateStatus::Ready, None);
            }
            Err(e) => {
                tracing::debug!(candidate = %id, reason = %e, "Platform needs manual selection");
                run.set_status(id, CandidateStatus::NeedsPlatformSelection, Some(e.to_string()));
            }
        }
    }
}
