//! Test Helper Utilities
//!
//! In-memory collaborators for driving the orchestrator without a store.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use romhold_common::events::{EventBus, PipelineEvent};
use romhold_ingest::clients::{
    BatchEventStream, BatchUploader, DuplicateCheck, DuplicateOracle, PlatformRegistry,
};
use romhold_ingest::error::NetworkError;
use romhold_ingest::models::{BatchEvent, PerFileResult, Platform, RomFile, UploadBatch};
use romhold_ingest::services::content_hasher::sha256_hex;
use romhold_ingest::services::{ContentHasher, FileValidator, OrchestratorOptions, PipelineOrchestrator};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Oracle answering from a fixed set of stored fingerprints
#[derive(Default)]
pub struct FakeOracle {
    stored: HashMap<String, String>,
    failing: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark this content as already stored under `record`
    pub fn with_stored_content(mut self, content: &[u8], record: &str) -> Self {
        self.stored.insert(sha256_hex(content), record.to_string());
        self
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DuplicateOracle for FakeOracle {
    async fn check(&self, fingerprint: &str) -> Result<DuplicateCheck, NetworkError> {
        self.calls.lock().unwrap().push(fingerprint.to_string());
        if self.failing {
            return Err(NetworkError::Transport("connection refused".to_string()));
        }
        Ok(match self.stored.get(fingerprint) {
            Some(record) => DuplicateCheck::duplicate_of(record.clone()),
            None => DuplicateCheck::unique(),
        })
    }
}

/// Registry returning a fixed list, or failing
pub struct FakeRegistry {
    platforms: Option<Vec<Platform>>,
}

impl FakeRegistry {
    pub fn new(platforms: Vec<Platform>) -> Self {
        Self {
            platforms: Some(platforms),
        }
    }

    pub fn unavailable() -> Self {
        Self { platforms: None }
    }
}

#[async_trait]
impl PlatformRegistry for FakeRegistry {
    async fn list_active(&self) -> Result<Vec<Platform>, NetworkError> {
        self.platforms
            .clone()
            .ok_or_else(|| NetworkError::Api(503, "registry down".to_string()))
    }
}

/// How the fake uploader answers a batch
#[derive(Debug, Clone)]
pub enum BatchBehaviour {
    /// Every file accepted
    Succeed,
    /// Batch-level network failure
    FailBatch(String),
    /// Named files rejected, the rest accepted
    RejectFiles(HashSet<String>),
    /// Named file missing from the result list
    OmitFile(String),
    /// Stream ends after progress, with no verdict
    NoVerdict,
}

/// Uploader scripted per platform id; records every batch it receives
#[derive(Default)]
pub struct FakeUploader {
    behaviours: HashMap<i64, BatchBehaviour>,
    cancel_on_upload: Option<CancellationToken>,
    pub batches: Mutex<Vec<(i64, Vec<String>)>>,
}

impl FakeUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behaviour(mut self, platform_id: i64, behaviour: BatchBehaviour) -> Self {
        self.behaviours.insert(platform_id, behaviour);
        self
    }

    /// Cancel the run as soon as the first batch starts
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_upload = Some(token);
        self
    }

    pub fn uploaded(&self) -> Vec<(i64, Vec<String>)> {
        self.batches.lock().unwrap().clone()
    }
}

impl BatchUploader for FakeUploader {
    fn upload(&self, batch: &UploadBatch) -> BatchEventStream {
        let names: Vec<String> = batch.files.iter().map(|c| c.name().to_string()).collect();
        self.batches
            .lock()
            .unwrap()
            .push((batch.platform_id, names.clone()));

        if let Some(token) = &self.cancel_on_upload {
            token.cancel();
        }

        let total = batch.total_bytes();
        let half = BatchEvent::Progress {
            bytes_transferred: total / 2,
            bytes_total: total,
        };
        let behaviour = self
            .behaviours
            .get(&batch.platform_id)
            .cloned()
            .unwrap_or(BatchBehaviour::Succeed);

        let events = match behaviour {
            BatchBehaviour::Succeed => vec![
                half,
                BatchEvent::Results(names.iter().map(PerFileResult::ok).collect()),
            ],
            BatchBehaviour::FailBatch(message) => vec![half, BatchEvent::Failed(message)],
            BatchBehaviour::RejectFiles(rejected) => vec![BatchEvent::Results(
                names
                    .iter()
                    .map(|n| {
                        if rejected.contains(n) {
                            PerFileResult::err(n, "Rejected by server")
                        } else {
                            PerFileResult::ok(n)
                        }
                    })
                    .collect(),
            )],
            BatchBehaviour::OmitFile(omitted) => vec![BatchEvent::Results(
                names
                    .iter()
                    .filter(|n| **n != omitted)
                    .map(PerFileResult::ok)
                    .collect(),
            )],
            BatchBehaviour::NoVerdict => vec![half],
        };

        Box::pin(stream::iter(events))
    }
}

/// Orchestrator over fakes with fast progress events
pub fn orchestrator(
    oracle: Arc<FakeOracle>,
    registry: FakeRegistry,
    uploader: Arc<FakeUploader>,
) -> PipelineOrchestrator {
    orchestrator_with(oracle, registry, uploader, FileValidator::default(), ContentHasher::default(), 0)
}

pub fn orchestrator_with(
    oracle: Arc<FakeOracle>,
    registry: FakeRegistry,
    uploader: Arc<FakeUploader>,
    validator: FileValidator,
    hasher: ContentHasher,
    max_concurrent_batches: usize,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        validator,
        hasher,
        oracle,
        Arc::new(registry),
        uploader,
        OrchestratorOptions {
            hash_concurrency: 2,
            max_concurrent_batches,
            progress_interval: Duration::ZERO,
        },
    )
    .with_event_bus(EventBus::new(1024))
}

pub fn nes_registry() -> Vec<Platform> {
    vec![
        Platform::with_list(1, "NES", &["nes"]),
        Platform::with_encoded(2, "SNES", r#"["snes", "smc", "sfc"]"#),
    ]
}

pub fn rom(name: &str, content: &[u8]) -> RomFile {
    RomFile::from_bytes(name, content.to_vec(), 1_700_000_000_000)
}

/// Drain every event already buffered on a receiver
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
