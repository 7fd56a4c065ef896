//! Upload batches and the events a batch upload produces

use crate::models::UploadCandidate;
use romhold_common::events::CandidateId;
use serde::{Deserialize, Serialize};

/// Ready candidates sharing one resolved platform
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub platform_id: i64,
    pub files: Vec<UploadCandidate>,
}

impl UploadBatch {
    /// Sum of file sizes in the batch
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|c| c.file.size).sum()
    }

    pub fn candidate_ids(&self) -> Vec<CandidateId> {
        self.files.iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Server verdict for one file of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerFileResult {
    pub filename: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PerFileResult {
    pub fn ok(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: true,
            message: None,
        }
    }

    pub fn err(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: false,
            message: Some(message.into()),
        }
    }
}

/// One item of a batch's event stream
///
/// A well-formed stream is zero or more `Progress` items followed by one
/// `Results` or one `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Progress { bytes_transferred: u64, bytes_total: u64 },
    Results(Vec<PerFileResult>),
    /// Batch-level failure; every file in the batch fails with this message
    Failed(String),
}
