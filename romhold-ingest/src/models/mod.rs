//! Data models for the ingest pipeline

pub mod batch;
pub mod candidate;
pub mod platform;
pub mod rom_file;
pub mod run_result;
pub mod session;

pub use batch::{BatchEvent, PerFileResult, UploadBatch};
pub use candidate::{Fingerprint, FingerprintKind, PlatformDetection, UploadCandidate};
pub use platform::{ExtensionSource, IndexedPlatform, Platform, PlatformExtensionIndex};
pub use rom_file::RomFile;
pub use run_result::PipelineRunResult;
pub use session::{PipelineSession, StateTransition};
