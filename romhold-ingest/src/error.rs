//! Error types for romhold-ingest
//!
//! Per-file failures never escape a run: each is rendered into the
//! candidate's `error` field. These types exist so stages can report
//! *what* went wrong before the orchestrator records it.

use thiserror::Error;

/// File rejected before any content is read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// File exceeds the configured size ceiling
    #[error("File too large: {size} bytes exceeds the {max} byte limit")]
    FileTooLarge { size: u64, max: u64 },

    /// Filename has no text after its last '.'
    #[error("File name has no extension")]
    MissingExtension,
}

impl ValidationError {
    /// Stable code for reporting
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ValidationError::MissingExtension => "MISSING_EXTENSION",
        }
    }
}

/// Content could not be fingerprinted
#[derive(Debug, Error)]
pub enum HashError {
    /// File content could not be read at all
    #[error("Hash unavailable: {0}")]
    HashUnavailable(String),
}

/// Platform could not be resolved automatically
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// No platform in the registry claims the extension
    #[error("No platform recognizes extension '{0}'")]
    PlatformUnknown(String),

    /// More than one platform claims the extension
    #[error("{count} platforms recognize extension '{extension}'")]
    PlatformAmbiguous { extension: String, count: usize },

    /// User picked a platform that is not in the registry snapshot
    #[error("Platform {0} is not in the active registry")]
    NotInRegistry(i64),
}

/// Remote collaborator call failed
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Transport-level failure (connect, timeout, body)
    #[error("Network error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Response body did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            NetworkError::Parse(err.to_string())
        } else {
            NetworkError::Transport(err.to_string())
        }
    }
}
