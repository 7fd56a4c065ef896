//! Progress aggregation across concurrent batches
//!
//! Each registered batch carries a weight (the sum of its files' sizes) and
//! a fraction complete. The overall percentage is the byte-weighted average
//! of batch fractions. A batch that reached a terminal outcome counts as
//! 100% regardless of the last progress it reported.
//!
//! The per-file ledger is keyed by [`CandidateId`]. Merging is commutative:
//! results for different batches touch disjoint ledger entries and
//! percentage is a sum, so completion order never changes the final state.

use crate::models::{PerFileResult, UploadBatch};
use romhold_common::events::{CandidateId, CandidateStatus};
use serde::Serialize;
use std::collections::BTreeMap;

/// Message recorded when a batch's results omit one of its files
pub const NO_RESULT_MESSAGE: &str = "No result reported";

/// Position of a batch in the run's plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BatchId(pub usize);

/// Ledger entry for one uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub file_name: String,
    pub batch: BatchId,
    pub status: CandidateStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct BatchProgress {
    platform_id: i64,
    weight: u64,
    bytes_transferred: u64,
    bytes_total: u64,
    files: Vec<CandidateId>,
    terminal: bool,
}

impl BatchProgress {
    fn fraction(&self) -> f64 {
        if self.terminal {
            1.0
        } else if self.bytes_total == 0 {
            0.0
        } else {
            (self.bytes_transferred as f64 / self.bytes_total as f64).clamp(0.0, 1.0)
        }
    }
}

/// Batch-level tally returned when a batch resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchTally {
    pub platform_id: i64,
    pub succeeded: usize,
    pub failed: usize,
}

/// Merges progress and results from concurrent batches
#[derive(Debug, Clone, Default)]
pub struct ProgressAggregator {
    batches: BTreeMap<BatchId, BatchProgress>,
    ledger: BTreeMap<CandidateId, LedgerEntry>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a batch and mark its files as uploading
    pub fn register_batch(&mut self, id: BatchId, batch: &UploadBatch) {
        for candidate in &batch.files {
            self.ledger.insert(
                candidate.id,
                LedgerEntry {
                    file_name: candidate.name().to_string(),
                    batch: id,
                    status: CandidateStatus::Uploading,
                    error: None,
                },
            );
        }

        self.batches.insert(
            id,
            BatchProgress {
                platform_id: batch.platform_id,
                weight: batch.total_bytes(),
                bytes_transferred: 0,
                bytes_total: 0,
                files: batch.candidate_ids(),
                terminal: false,
            },
        );
    }

    /// Record bytes-sent progress for a batch
    ///
    /// Ignored once the batch is terminal or if the batch is unknown.
    pub fn record_progress(&mut self, id: BatchId, bytes_transferred: u64, bytes_total: u64) {
        match self.batches.get_mut(&id) {
            Some(batch) if !batch.terminal => {
                batch.bytes_transferred = bytes_transferred;
                batch.bytes_total = bytes_total;
            }
            Some(_) => {}
            None => tracing::warn!(batch = id.0, "Progress for unknown batch ignored"),
        }
    }

    /// Apply a batch's per-file results
    ///
    /// Results are matched to files by name; with repeated names each
    /// result claims the first still-unmatched file. Files the server did
    /// not mention fail with [`NO_RESULT_MESSAGE`]. Returns `None` if the
    /// batch is unknown or already terminal.
    pub fn record_results(&mut self, id: BatchId, results: &[PerFileResult]) -> Option<BatchTally> {
        let files = self.open_batch_files(id)?;

        let mut unmatched = files.clone();
        let mut tally = BatchTally::default();

        for result in results {
            let position = unmatched.iter().position(|candidate| {
                self.ledger
                    .get(candidate)
                    .map(|entry| entry.file_name == result.filename)
                    .unwrap_or(false)
            });

            let Some(position) = position else {
                tracing::warn!(
                    batch = id.0,
                    file = %result.filename,
                    "Result for a file not in the batch ignored"
                );
                continue;
            };

            let candidate = unmatched.remove(position);
            if let Some(entry) = self.ledger.get_mut(&candidate) {
                if result.success {
                    entry.status = CandidateStatus::Succeeded;
                    entry.error = None;
                    tally.succeeded += 1;
                } else {
                    entry.status = CandidateStatus::Failed;
                    entry.error = Some(
                        result
                            .message
                            .clone()
                            .unwrap_or_else(|| "Upload rejected".to_string()),
                    );
                    tally.failed += 1;
                }
            }
        }

        for candidate in unmatched {
            if let Some(entry) = self.ledger.get_mut(&candidate) {
                entry.status = CandidateStatus::Failed;
                entry.error = Some(NO_RESULT_MESSAGE.to_string());
                tally.failed += 1;
            }
        }

        Some(self.finish_batch(id, tally))
    }

    /// Fail every file of a batch with one batch-level error
    pub fn record_batch_failure(&mut self, id: BatchId, message: &str) -> Option<BatchTally> {
        let files = self.open_batch_files(id)?;

        let mut tally = BatchTally::default();
        for candidate in files {
            if let Some(entry) = self.ledger.get_mut(&candidate) {
                entry.status = CandidateStatus::Failed;
                entry.error = Some(message.to_string());
                tally.failed += 1;
            }
        }

        Some(self.finish_batch(id, tally))
    }

    fn open_batch_files(&self, id: BatchId) -> Option<Vec<CandidateId>> {
        match self.batches.get(&id) {
            Some(batch) if !batch.terminal => Some(batch.files.clone()),
            Some(_) => {
                tracing::warn!(batch = id.0, "Batch already resolved, ignoring second outcome");
                None
            }
            None => {
                tracing::warn!(batch = id.0, "Outcome for unknown batch ignored");
                None
            }
        }
    }

    fn finish_batch(&mut self, id: BatchId, mut tally: BatchTally) -> BatchTally {
        if let Some(batch) = self.batches.get_mut(&id) {
            batch.terminal = true;
            tally.platform_id = batch.platform_id;
        }
        tally
    }

    /// Byte-weighted overall percentage in `0.0..=100.0`
    ///
    /// Zero total weight (nothing to upload, or only empty files) is 100%.
    pub fn overall_percentage(&self) -> f64 {
        let total_weight = self.total_bytes();
        if total_weight == 0 {
            return 100.0;
        }

        let weighted: f64 = self
            .batches
            .values()
            .map(|b| b.weight as f64 * b.fraction())
            .sum();

        (weighted / total_weight as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Weighted bytes done, for display alongside the percentage
    pub fn bytes_transferred(&self) -> u64 {
        self.batches
            .values()
            .map(|b| (b.weight as f64 * b.fraction()).round() as u64)
            .sum()
    }

    /// Sum of all registered batch weights
    pub fn total_bytes(&self) -> u64 {
        self.batches.values().map(|b| b.weight).sum()
    }

    /// Every registered batch has reported a terminal outcome
    pub fn is_complete(&self) -> bool {
        self.batches.values().all(|b| b.terminal)
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Whether a batch has reported its outcome (unknown batches count as not)
    pub fn is_batch_terminal(&self, id: BatchId) -> bool {
        self.batches.get(&id).map(|b| b.terminal).unwrap_or(false)
    }

    /// Ledger entries belonging to one batch
    pub fn batch_entries(&self, id: BatchId) -> impl Iterator<Item = (CandidateId, &LedgerEntry)> {
        self.ledger
            .iter()
            .filter(move |(_, entry)| entry.batch == id)
            .map(|(candidate, entry)| (*candidate, entry))
    }

    pub fn entry(&self, candidate: CandidateId) -> Option<&LedgerEntry> {
        self.ledger.get(&candidate)
    }

    /// Per-file ledger, ordered by candidate id
    pub fn ledger(&self) -> &BTreeMap<CandidateId, LedgerEntry> {
        &self.ledger
    }
}
