//! romhold-ingest: client-side ROM ingestion pipeline
//!
//! Validates a set of ROM files, drops content the store already holds,
//! infers each file's platform from its extension and uploads the rest in
//! per-platform batches. See [`services::PipelineOrchestrator`].

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::config::IngestConfig;
pub use crate::models::PipelineRunResult;
pub use crate::services::{decision_channel, PipelineOrchestrator, RunControls, UserDecision};

use crate::clients::{
    HttpBatchUploader, HttpDuplicateOracle, HttpPlatformRegistry, PlatformRegistry,
    StaticPlatformRegistry,
};
use romhold_common::events::EventBus;
use romhold_common::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Wire an orchestrator to the HTTP store described by `config`
///
/// With `registry_file`, platforms come from that JSON file instead of the
/// store's registry endpoint.
pub fn build_orchestrator(
    config: &IngestConfig,
    registry_file: Option<&Path>,
    event_bus: EventBus,
) -> Result<PipelineOrchestrator> {
    let http_client = reqwest::Client::builder()
        .user_agent(clients::USER_AGENT)
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| Error::Config(format!("HTTP client setup failed: {}", e)))?;

    let registry: Arc<dyn PlatformRegistry> = match registry_file {
        Some(path) => Arc::new(StaticPlatformRegistry::from_file(path)?),
        None => Arc::new(HttpPlatformRegistry::with_client(
            http_client.clone(),
            config.server_url.clone(),
        )),
    };

    let uploader = HttpBatchUploader::new(config.server_url.clone(), config.connect_timeout)
        .map_err(|e| Error::Config(format!("HTTP client setup failed: {}", e)))?;

    let orchestrator = PipelineOrchestrator::new(
        config.validator(),
        config.hasher(),
        Arc::new(HttpDuplicateOracle::with_client(http_client.clone(), config.server_url.clone())),
        registry,
        Arc::new(uploader),
        config.orchestrator_options(),
    )
    .with_event_bus(event_bus);

    Ok(orchestrator)
}
