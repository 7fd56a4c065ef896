//! Aggregate outcome of one pipeline run

use crate::models::UploadCandidate;
use chrono::{DateTime, Utc};
use romhold_common::events::{CandidateStatus, OutcomeClass, RunSummary};
use uuid::Uuid;

/// Result handed back to the caller once every batch has resolved
#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    pub run_id: Uuid,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_as_duplicate: usize,
    pub invalid: usize,
    pub needs_platform_selection: usize,
    pub discarded: usize,
    /// Run was cancelled before it finished normally
    pub cancelled: bool,
    /// Snapshot of every candidate at completion, input order
    pub per_file_results: Vec<UploadCandidate>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl PipelineRunResult {
    /// Tally counts from the final candidate snapshot
    pub fn from_candidates(
        run_id: Uuid,
        candidates: Vec<UploadCandidate>,
        cancelled: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        let count = |status: CandidateStatus| candidates.iter().filter(|c| c.status == status).count();

        Self {
            run_id,
            succeeded: count(CandidateStatus::Succeeded),
            failed: count(CandidateStatus::Failed),
            skipped_as_duplicate: count(CandidateStatus::Duplicate),
            invalid: count(CandidateStatus::Invalid),
            needs_platform_selection: count(CandidateStatus::NeedsPlatformSelection),
            discarded: count(CandidateStatus::Discarded),
            cancelled,
            per_file_results: candidates,
            started_at,
            ended_at: Utc::now(),
        }
    }

    pub fn outcome(&self) -> OutcomeClass {
        OutcomeClass::from_counts(self.succeeded, self.failed)
    }

    pub fn message(&self) -> String {
        self.outcome().message(self.succeeded, self.failed)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped_as_duplicate: self.skipped_as_duplicate,
            invalid: self.invalid,
            needs_platform_selection: self.needs_platform_selection,
            discarded: self.discarded,
            outcome: self.outcome(),
            cancelled: self.cancelled,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Candidates in a given status
    pub fn with_status(&self, status: CandidateStatus) -> impl Iterator<Item = &UploadCandidate> {
        self.per_file_results.iter().filter(move |c| c.status == status)
    }
}
