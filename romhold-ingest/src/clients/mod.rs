//! External collaborators: duplicate oracle, platform registry, uploader
//!
//! Each boundary is a trait so the orchestrator can be driven by the HTTP
//! implementations here or by in-memory fakes.

pub mod batch_uploader;
pub mod duplicate_oracle;
pub mod platform_registry;

pub use batch_uploader::{BatchEventStream, BatchUploader, HttpBatchUploader};
pub use duplicate_oracle::{DuplicateCheck, DuplicateOracle, HttpDuplicateOracle};
pub use platform_registry::{HttpPlatformRegistry, PlatformRegistry, StaticPlatformRegistry};

pub(crate) const USER_AGENT: &str = concat!("romhold/", env!("CARGO_PKG_VERSION"));

pub(crate) fn trim_base_url(mut base_url: String) -> String {
    while base_url.ends_with('/') {
        base_url.pop();
    }
    base_url
}
