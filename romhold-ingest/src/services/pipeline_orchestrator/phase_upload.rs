//! PLANNING → UPLOADING → AGGREGATING
//!
//! Every batch's event stream is merged with `flatten_unordered`, bounded
//! by `max_concurrent_batches` (0 = all at once). A batch only starts when
//! the merge first polls it, so a cancelled run marks the rest as failed
//! instead of starting them. Streams already running are drained.

use super::{PipelineOrchestrator, RunContext, CANCELLED_MESSAGE};
use crate::models::{BatchEvent, UploadBatch};
use crate::services::progress_aggregator::{BatchId, BatchTally, ProgressAggregator};
use futures::stream::{self, BoxStream, StreamExt};
use romhold_common::events::{CandidateStatus, PipelineEvent, RunState};
use std::sync::Arc;
use tokio::time::Instant;

/// Failure message for a batch stream that ended without a verdict
pub const NO_VERDICT_MESSAGE: &str = "Upload ended without results";

enum BatchSignal {
    Started { platform_id: i64, file_count: usize, total_bytes: u64 },
    Event(BatchEvent),
    Ended,
    Skipped,
}

impl PipelineOrchestrator {
    pub(super) async fn phase_upload(&self, run: &mut RunContext) {
        run.transition(RunState::Planning);

        let plan = self.planner.plan(&run.candidates);
        for id in &plan.unresolved {
            run.set_status(*id, CandidateStatus::NeedsPlatformSelection, Some("No platform resolved".to_string()));
        }

        tracing::info!(
            run_id = %run.run_id(),
            batches = plan.batches.len(),
            files = plan.total_files(),
            bytes = plan.total_bytes(),
            "Upload plan ready"
        );

        run.transition(RunState::Uploading);

        let mut aggregator = ProgressAggregator::new();
        for (index, batch) in plan.batches.iter().enumerate() {
            aggregator.register_batch(BatchId(index), batch);
            for id in batch.candidate_ids() {
                run.set_status(id, CandidateStatus::Uploading, None);
            }
        }

        let mut uploads = self.batch_streams(plan.batches, run);
        let mut last_progress: Option<Instant> = None;

        while let Some((batch_id, signal)) = uploads.next().await {
            match signal {
                BatchSignal::Started { platform_id, file_count, total_bytes } => {
                    tracing::debug!(run_id = %run.run_id(), batch = batch_id.0, platform_id, file_count, "Batch submitted");
                    run.emit(PipelineEvent::BatchSubmitted {
                        run_id: run.run_id(),
                        platform_id,
                        file_count,
                        total_bytes,
                    });
                }
                BatchSignal::Event(BatchEvent::Progress { bytes_transferred, bytes_total }) => {
                    aggregator.record_progress(batch_id, bytes_transferred, bytes_total);
                    let due = last_progress
                        .map(|at| at.elapsed() >= self.options.progress_interval)
                        .unwrap_or(true);
                    if due && !aggregator.is_complete() {
                        self.emit_progress(run, &aggregator);
                        last_progress = Some(Instant::now());
                    }
                }
                BatchSignal::Event(BatchEvent::Results(results)) => {
                    let tally = aggregator.record_results(batch_id, &results);
                    self.settle_batch(run, &aggregator, batch_id, tally, None);
                }
                BatchSignal::Event(BatchEvent::Failed(message)) => {
                    let tally = aggregator.record_batch_failure(batch_id, &message);
                    self.settle_batch(run, &aggregator, batch_id, tally, Some(message));
                }
                BatchSignal::Ended => {
                    if !aggregator.is_batch_terminal(batch_id) {
                        let tally = aggregator.record_batch_failure(batch_id, NO_VERDICT_MESSAGE);
                        self.settle_batch(run, &aggregator, batch_id, tally, Some(NO_VERDICT_MESSAGE.to_string()));
                    }
                }
                BatchSignal::Skipped => {
                    let tally = aggregator.record_batch_failure(batch_id, CANCELLED_MESSAGE);
                    self.settle_batch(run, &aggregator, batch_id, tally, Some(CANCELLED_MESSAGE.to_string()));
                }
            }
        }

        run.transition(RunState::Aggregating);

        // Final 100% is never throttled
        self.emit_progress(run, &aggregator);
    }

    /// Merge per-batch event streams, each tagged with its batch id
    fn batch_streams(
        &self,
        batches: Vec<UploadBatch>,
        run: &RunContext,
    ) -> BoxStream<'static, (BatchId, BatchSignal)> {
        let uploader = Arc::clone(&self.uploader);
        let cancel = run.cancel.clone();
        let limit = (self.options.max_concurrent_batches > 0).then_some(self.options.max_concurrent_batches);

        stream::iter(batches.into_iter().enumerate())
            .map(move |(index, batch)| {
                let id = BatchId(index);
                if cancel.is_cancelled() {
                    return stream::iter(vec![(id, BatchSignal::Skipped)]).boxed();
                }

                let started = BatchSignal::Started {
                    platform_id: batch.platform_id,
                    file_count: batch.len(),
                    total_bytes: batch.total_bytes(),
                };
                let events = uploader.upload(&batch).map(move |event| (id, BatchSignal::Event(event)));

                stream::iter(vec![(id, started)])
                    .chain(events)
                    .chain(stream::iter(vec![(id, BatchSignal::Ended)]))
                    .boxed()
            })
            .flatten_unordered(limit)
            .boxed()
    }

    /// Copy a resolved batch's ledger entries onto the candidates
    fn settle_batch(
        &self,
        run: &mut RunContext,
        aggregator: &ProgressAggregator,
        batch_id: BatchId,
        tally: Option<BatchTally>,
        error: Option<String>,
    ) {
        let Some(tally) = tally else {
            return;
        };

        for (id, entry) in aggregator.batch_entries(batch_id) {
            run.set_status(id, entry.status, entry.error.clone());
        }

        if error.is_some() {
            tracing::warn!(
                run_id = %run.run_id(),
                batch = batch_id.0,
                platform_id = tally.platform_id,
                error = ?error,
                "Batch failed"
            );
        } else {
            tracing::info!(
                run_id = %run.run_id(),
                batch = batch_id.0,
                platform_id = tally.platform_id,
                succeeded = tally.succeeded,
                failed = tally.failed,
                "Batch completed"
            );
        }

        run.emit(PipelineEvent::BatchCompleted {
            run_id: run.run_id(),
            platform_id: tally.platform_id,
            succeeded: tally.succeeded,
            failed: tally.failed,
            error,
        });
    }

    fn emit_progress(&self, run: &RunContext, aggregator: &ProgressAggregator) {
        run.emit(PipelineEvent::UploadProgress {
            run_id: run.run_id(),
            percentage: aggregator.overall_percentage(),
            bytes_transferred: aggregator.bytes_transferred(),
            bytes_total: aggregator.total_bytes(),
        });
    }
}
