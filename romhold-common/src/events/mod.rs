//! Event types for the ingest pipeline
//!
//! The pipeline exposes what happens during a run as plain event data on a
//! per-orchestrator [`EventBus`]. Callers decide how to surface it (terminal
//! output, UI notifications, SSE relay); nothing here is process-global.

mod pipeline_types;

pub use pipeline_types::{
    CandidateId, CandidateStatus, OutcomeClass, PendingSelection, PlatformOption, RunState,
    RunSummary,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Ingest pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A new file set entered the pipeline
    RunStarted {
        run_id: Uuid,
        file_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Run-level state transition
    StateChanged {
        run_id: Uuid,
        old_state: RunState,
        new_state: RunState,
        timestamp: DateTime<Utc>,
    },

    /// A candidate moved to a new status
    CandidateUpdated {
        run_id: Uuid,
        candidate: CandidateId,
        file_name: String,
        status: CandidateStatus,
        error: Option<String>,
    },

    /// Matching content already exists in the store
    ///
    /// The candidate is held, not discarded; the user may force it through.
    DuplicateDetected {
        run_id: Uuid,
        candidate: CandidateId,
        file_name: String,
        existing_record_ref: Option<String>,
    },

    /// Planning is paused until every listed file has a platform
    AwaitingPlatformSelection {
        run_id: Uuid,
        pending: Vec<PendingSelection>,
    },

    /// A per-platform batch was handed to the uploader
    BatchSubmitted {
        run_id: Uuid,
        platform_id: i64,
        file_count: usize,
        total_bytes: u64,
    },

    /// Overall upload progress across all in-flight batches
    UploadProgress {
        run_id: Uuid,
        percentage: f64,
        bytes_transferred: u64,
        bytes_total: u64,
    },

    /// A batch reported its terminal outcome
    BatchCompleted {
        run_id: Uuid,
        platform_id: i64,
        succeeded: usize,
        failed: usize,
        error: Option<String>,
    },

    /// The run finished (done or cancelled)
    RunCompleted {
        run_id: Uuid,
        summary: RunSummary,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            PipelineEvent::RunStarted { .. } => "RunStarted",
            PipelineEvent::StateChanged { .. } => "StateChanged",
            PipelineEvent::CandidateUpdated { .. } => "CandidateUpdated",
            PipelineEvent::DuplicateDetected { .. } => "DuplicateDetected",
            PipelineEvent::AwaitingPlatformSelection { .. } => "AwaitingPlatformSelection",
            PipelineEvent::BatchSubmitted { .. } => "BatchSubmitted",
            PipelineEvent::UploadProgress { .. } => "UploadProgress",
            PipelineEvent::BatchCompleted { .. } => "BatchCompleted",
            PipelineEvent::RunCompleted { .. } => "RunCompleted",
        }
    }

    /// Run the event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            PipelineEvent::RunStarted { run_id, .. }
            | PipelineEvent::StateChanged { run_id, .. }
            | PipelineEvent::CandidateUpdated { run_id, .. }
            | PipelineEvent::DuplicateDetected { run_id, .. }
            | PipelineEvent::AwaitingPlatformSelection { run_id, .. }
            | PipelineEvent::BatchSubmitted { run_id, .. }
            | PipelineEvent::UploadProgress { run_id, .. }
            | PipelineEvent::BatchCompleted { run_id, .. }
            | PipelineEvent::RunCompleted { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast bus for pipeline events
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lag and lose the oldest events once `capacity`
    /// events are buffered.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
