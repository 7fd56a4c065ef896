//! Pipeline services

pub mod content_hasher;
pub mod file_scanner;
pub mod file_validator;
pub mod pipeline_orchestrator;
pub mod platform_detector;
pub mod progress_aggregator;
pub mod upload_planner;

pub use content_hasher::ContentHasher;
pub use file_scanner::{FileScanner, ScanError, ScanResult};
pub use file_validator::FileValidator;
pub use pipeline_orchestrator::{
    decision_channel, DecisionReceiver, OrchestratorOptions, PipelineOrchestrator, RunControls,
    UserDecision,
};
pub use platform_detector::PlatformDetector;
pub use progress_aggregator::{BatchId, LedgerEntry, ProgressAggregator};
pub use upload_planner::{UploadPlan, UploadPlanner};
