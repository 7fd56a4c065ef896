//! Upload planning
//!
//! Partitions ready candidates into one batch per resolved platform. Batch
//! order follows the first appearance of each platform id in the input;
//! file order within a batch follows input order.

use crate::models::{UploadBatch, UploadCandidate};
use romhold_common::events::{CandidateId, CandidateStatus};
use std::collections::HashMap;

/// Batches to submit plus ready candidates that lacked a platform
#[derive(Debug, Clone, Default)]
pub struct UploadPlan {
    pub batches: Vec<UploadBatch>,
    /// Ready candidates with no resolved platform; callers report these as
    /// needing platform selection
    pub unresolved: Vec<CandidateId>,
}

impl UploadPlan {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn total_files(&self) -> usize {
        self.batches.iter().map(UploadBatch::len).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.batches.iter().map(UploadBatch::total_bytes).sum()
    }
}

/// Groups ready candidates by platform
#[derive(Debug, Default, Clone, Copy)]
pub struct UploadPlanner;

impl UploadPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Build the batch plan
    ///
    /// Only `ready` candidates are considered. Anything else (duplicates
    /// awaiting confirmation, failures, pending selections) is left out.
    pub fn plan(&self, candidates: &[UploadCandidate]) -> UploadPlan {
        let mut plan = UploadPlan::default();
        let mut batch_for_platform: HashMap<i64, usize> = HashMap::new();

        for candidate in candidates.iter().filter(|c| c.status == CandidateStatus::Ready) {
            let Some(platform_id) = candidate.resolved_platform_id else {
                tracing::warn!(
                    candidate = %candidate.id,
                    file = %candidate.name(),
                    "Ready candidate has no platform, holding back"
                );
                plan.unresolved.push(candidate.id);
                continue;
            };

            let position = *batch_for_platform.entry(platform_id).or_insert_with(|| {
                plan.batches.push(UploadBatch {
                    platform_id,
                    files: Vec::new(),
                });
                plan.batches.len() - 1
            });
            plan.batches[position].files.push(candidate.clone());
        }

        tracing::debug!(
            batches = plan.batches.len(),
            files = plan.total_files(),
            unresolved = plan.unresolved.len(),
            "Built upload plan"
        );

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fingerprint, RomFile};

    fn ready(i: usize, platform: Option<i64>) -> UploadCandidate {
        let mut c = UploadCandidate::new(
            CandidateId(i),
            RomFile::from_bytes(format!("game{}.rom", i), vec![0u8; 10 * (i + 1)], 0),
        );
        c.fingerprint = Some(Fingerprint::sha256(format!("{:064}", i)));
        c.resolved_platform_id = platform;
        c.status = CandidateStatus::Ready;
        c
    }

    #[test]
    fn test_groups_by_platform_in_first_appearance_order() {
        let candidates = vec![ready(0, Some(7)), ready(1, Some(3)), ready(2, Some(7)), ready(3, Some(3))];
        let plan = UploadPlanner::new().plan(&candidates);

        let platforms: Vec<i64> = plan.batches.iter().map(|b| b.platform_id).collect();
        assert_eq!(platforms, vec![7, 3]);
        assert_eq!(plan.batches[0].candidate_ids(), vec![CandidateId(0), CandidateId(2)]);
        assert_eq!(plan.batches[1].candidate_ids(), vec![CandidateId(1), CandidateId(3)]);
        assert_eq!(plan.batches[0].total_bytes(), 10 + 30);
    }

    #[test]
    fn test_never_mixes_platforms() {
        let candidates: Vec<_> = (0..12).map(|i| ready(i, Some((i % 4) as i64))).collect();
        let plan = UploadPlanner::new().plan(&candidates);
        for batch in &plan.batches {
            assert!(batch
                .files
                .iter()
                .all(|c| c.resolved_platform_id == Some(batch.platform_id)));
        }
        assert_eq!(plan.total_files(), 12);
    }

    #[test]
    fn test_unresolved_ready_candidates_reported() {
        let candidates = vec![ready(0, Some(1)), ready(1, None)];
        let plan = UploadPlanner::new().plan(&candidates);
        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.unresolved, vec![CandidateId(1)]);
    }

    #[test]
    fn test_non_ready_candidates_excluded() {
        let mut duplicate = ready(0, Some(1));
        duplicate.status = CandidateStatus::Duplicate;
        let mut failed = ready(1, Some(1));
        failed.status = CandidateStatus::Failed;

        let plan = UploadPlanner::new().plan(&[duplicate, failed]);
        assert!(plan.is_empty());
        assert!(plan.unresolved.is_empty());
        assert_eq!(plan.total_bytes(), 0);
    }
}
