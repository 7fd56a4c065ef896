//! Upload candidates: one per input file, tracked from intake to terminal status

use crate::models::RomFile;
use romhold_common::events::{CandidateId, CandidateStatus, PendingSelection, PlatformOption};
use serde::{Deserialize, Serialize};

/// How a fingerprint was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintKind {
    /// SHA-256 over the full content
    Sha256,
    /// 32-bit rolling hash over name, size, mtime and content edges
    Weak,
    /// Weak hash over metadata only; content was unreadable
    MetadataOnly,
}

/// Content-derived identifier used for duplicate detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub value: String,
    pub kind: FingerprintKind,
}

impl Fingerprint {
    pub fn sha256(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: FingerprintKind::Sha256,
        }
    }

    pub fn weak(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: FingerprintKind::Weak,
        }
    }

    pub fn metadata_only(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: FingerprintKind::MetadataOnly,
        }
    }

    /// Only strong digests are authoritative for duplicate detection
    pub fn is_authoritative(&self) -> bool {
        self.kind == FingerprintKind::Sha256
    }

    /// Whether the duplicate oracle should be asked about this fingerprint
    pub fn is_checkable(&self) -> bool {
        self.kind != FingerprintKind::MetadataOnly
    }
}

/// Platform detection outcome for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDetection {
    /// Normalized extension (lowercase, no dot); empty if the name has none
    pub extension: String,
    /// Matching platforms in registry order
    pub possible_platforms: Vec<PlatformOption>,
    /// Set only when exactly one platform matches
    pub recommended_platform: Option<i64>,
}

impl PlatformDetection {
    pub fn is_ambiguous(&self) -> bool {
        self.possible_platforms.len() > 1
    }

    pub fn is_unknown(&self) -> bool {
        self.possible_platforms.is_empty()
    }
}

/// One file tracked through the pipeline
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    pub id: CandidateId,
    pub file: RomFile,
    pub fingerprint: Option<Fingerprint>,
    pub resolved_platform_id: Option<i64>,
    pub status: CandidateStatus,
    pub error: Option<String>,
    /// Detection result from the run's registry snapshot
    pub detection: Option<PlatformDetection>,
    /// Reference to the stored record this file duplicates
    pub duplicate_of: Option<String>,
    /// User chose to upload despite a duplicate match
    pub duplicate_override: bool,
}

impl UploadCandidate {
    pub fn new(id: CandidateId, file: RomFile) -> Self {
        Self {
            id,
            file,
            fingerprint: None,
            resolved_platform_id: None,
            status: CandidateStatus::Pending,
            error: None,
            detection: None,
            duplicate_of: None,
            duplicate_override: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    /// Mark ready; callers must have set fingerprint and platform first
    pub fn mark_ready(&mut self) {
        debug_assert!(self.resolved_platform_id.is_some());
        debug_assert!(self.fingerprint.is_some());
        self.status = CandidateStatus::Ready;
        self.error = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = CandidateStatus::Failed;
        self.error = Some(message.into());
    }

    /// Whether the candidate satisfies the `ready` invariant
    pub fn is_upload_ready(&self) -> bool {
        self.status == CandidateStatus::Ready
            && self.resolved_platform_id.is_some()
            && self.fingerprint.is_some()
            && (self.duplicate_of.is_none() || self.duplicate_override)
    }

    /// Selection prompt for a candidate waiting on a platform
    pub fn pending_selection(&self) -> PendingSelection {
        let (extension, possible_platforms) = match &self.detection {
            Some(d) => (d.extension.clone(), d.possible_platforms.clone()),
            None => (String::new(), Vec::new()),
        };
        PendingSelection {
            candidate: self.id,
            file_name: self.file.name.clone(),
            extension,
            possible_platforms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_candidate_is_pending() {
        let candidate = UploadCandidate::new(CandidateId(0), RomFile::from_bytes("a.nes", vec![1], 0));
        assert_eq!(candidate.status, CandidateStatus::Pending);
        assert!(!candidate.is_upload_ready());
    }

    #[test]
    fn test_ready_invariant() {
        let mut candidate = UploadCandidate::new(CandidateId(0), RomFile::from_bytes("a.nes", vec![1], 0));
        candidate.fingerprint = Some(Fingerprint::sha256("ab"));
        candidate.resolved_platform_id = Some(7);
        candidate.mark_ready();
        assert!(candidate.is_upload_ready());

        candidate.duplicate_of = Some("rom-1".to_string());
        assert!(!candidate.is_upload_ready());
        candidate.duplicate_override = true;
        assert!(candidate.is_upload_ready());
    }

    #[test]
    fn test_fingerprint_authority() {
        assert!(Fingerprint::sha256("x").is_authoritative());
        assert!(!Fingerprint::weak("x").is_authoritative());
        assert!(Fingerprint::weak("x").is_checkable());
        assert!(!Fingerprint::metadata_only("x").is_checkable());
    }
}
