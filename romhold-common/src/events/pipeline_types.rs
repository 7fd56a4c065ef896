//! Ingest pipeline type definitions
//!
//! Supporting types shared by pipeline events and the ingest crate's ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one candidate within a run (its position in the input set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub usize);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Run-level pipeline state
///
/// idle → validating → hashing-and-dedup → awaiting-platform-selection (optional)
/// → planning → uploading → aggregating → done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    Validating,
    HashingAndDedup,
    AwaitingPlatformSelection,
    Planning,
    Uploading,
    Aggregating,
    Done,
    Cancelled,
}

impl RunState {
    /// Check if state is terminal (run finished)
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Cancelled)
    }
}

/// Per-candidate status in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateStatus {
    Pending,
    Validating,
    Hashing,
    DuplicateCheck,
    /// Matching content already stored; held for user confirmation
    Duplicate,
    NeedsPlatformSelection,
    Ready,
    Uploading,
    Succeeded,
    Failed,
    /// Rejected by validation; never advances
    Invalid,
    /// Explicitly dropped by the user
    Discarded,
}

impl CandidateStatus {
    /// Check if the candidate can no longer change within this run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CandidateStatus::Succeeded
                | CandidateStatus::Failed
                | CandidateStatus::Invalid
                | CandidateStatus::Discarded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Validating => "validating",
            CandidateStatus::Hashing => "hashing",
            CandidateStatus::DuplicateCheck => "duplicate-check",
            CandidateStatus::Duplicate => "duplicate",
            CandidateStatus::NeedsPlatformSelection => "needs-platform-selection",
            CandidateStatus::Ready => "ready",
            CandidateStatus::Uploading => "uploading",
            CandidateStatus::Succeeded => "succeeded",
            CandidateStatus::Failed => "failed",
            CandidateStatus::Invalid => "invalid",
            CandidateStatus::Discarded => "discarded",
        }
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform choice offered to the user for an unresolved file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformOption {
    pub id: i64,
    pub name: String,
}

/// A file waiting for an explicit platform assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSelection {
    pub candidate: CandidateId,
    pub file_name: String,
    /// Normalized extension (lowercase, no dot); empty if none
    pub extension: String,
    /// Registry-ordered matches; empty when no platform claims the extension
    pub possible_platforms: Vec<PlatformOption>,
}

/// Outcome class of a finished run, used to pick the summary tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeClass {
    /// Every uploaded file succeeded
    AllSucceeded,
    /// Some uploads succeeded, some failed
    Mixed,
    /// Every uploaded file failed
    TotalFailure,
    /// No file reached the upload stage
    NothingUploaded,
}

impl OutcomeClass {
    /// Classify from upload counts
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (0, 0) => OutcomeClass::NothingUploaded,
            (_, 0) => OutcomeClass::AllSucceeded,
            (0, _) => OutcomeClass::TotalFailure,
            _ => OutcomeClass::Mixed,
        }
    }

    /// User-facing summary line
    pub fn message(&self, succeeded: usize, failed: usize) -> String {
        match self {
            OutcomeClass::AllSucceeded => {
                format!("Successfully uploaded {} file(s)", succeeded)
            }
            OutcomeClass::Mixed => format!(
                "Uploaded {} file(s), {} failed - retry the failed files",
                succeeded, failed
            ),
            OutcomeClass::TotalFailure => {
                format!("Upload failed for all {} file(s)", failed)
            }
            OutcomeClass::NothingUploaded => "No files were uploaded".to_string(),
        }
    }

    /// Whether the caller should offer a retry
    pub fn should_prompt_retry(&self) -> bool {
        matches!(self, OutcomeClass::Mixed | OutcomeClass::TotalFailure)
    }
}

/// Aggregate counts carried by the completion event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_as_duplicate: usize,
    pub invalid: usize,
    pub needs_platform_selection: usize,
    pub discarded: usize,
    pub outcome: OutcomeClass,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn message(&self) -> String {
        self.outcome.message(self.succeeded, self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        assert_eq!(OutcomeClass::from_counts(3, 0), OutcomeClass::AllSucceeded);
        assert_eq!(OutcomeClass::from_counts(2, 1), OutcomeClass::Mixed);
        assert_eq!(OutcomeClass::from_counts(0, 4), OutcomeClass::TotalFailure);
        assert_eq!(OutcomeClass::from_counts(0, 0), OutcomeClass::NothingUploaded);
    }

    #[test]
    fn test_outcome_tones_differ() {
        let all = OutcomeClass::AllSucceeded.message(2, 0);
        let mixed = OutcomeClass::Mixed.message(1, 1);
        let total = OutcomeClass::TotalFailure.message(0, 2);
        assert_ne!(all, mixed);
        assert_ne!(mixed, total);
        assert!(mixed.contains("retry"));
        assert!(!OutcomeClass::AllSucceeded.should_prompt_retry());
        assert!(OutcomeClass::TotalFailure.should_prompt_retry());
    }

    #[test]
    fn test_candidate_status_serialization() {
        let json = serde_json::to_string(&CandidateStatus::NeedsPlatformSelection).unwrap();
        assert_eq!(json, "\"needs-platform-selection\"");
        assert_eq!(CandidateStatus::DuplicateCheck.as_str(), "duplicate-check");
        assert!(CandidateStatus::Invalid.is_terminal());
        assert!(!CandidateStatus::Duplicate.is_terminal());
    }

    #[test]
    fn test_run_state_terminal() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(!RunState::AwaitingPlatformSelection.is_terminal());
    }
}
