//! Batch uploader: one multi-file upload call per platform batch
//!
//! An upload is exposed as a stream of [`BatchEvent`]s: zero or more
//! `Progress` items, then one `Results` or one `Failed`. A stream that ends
//! without a terminal item is treated by the caller as a batch failure.

use crate::error::NetworkError;
use crate::models::{BatchEvent, PerFileResult, RomFile, UploadBatch};
use futures::stream::{self, Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

/// Chunk size used when streaming file bodies
pub const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Event stream for one batch upload
pub type BatchEventStream = Pin<Box<dyn Stream<Item = BatchEvent> + Send>>;

/// Performs one upload call per batch
pub trait BatchUploader: Send + Sync {
    /// Start uploading a batch; the returned stream drives the request
    fn upload(&self, batch: &UploadBatch) -> BatchEventStream;
}

/// Wire shape of the upload response
#[derive(Debug, Deserialize)]
struct UploadResponse {
    results: Vec<PerFileResult>,
}

/// Uploader backed by the store's multipart endpoint
pub struct HttpBatchUploader {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpBatchUploader {
    /// Uploads can run for minutes, so only connecting is bounded
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, NetworkError> {
        let http_client = reqwest::Client::builder()
            .user_agent(super::USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        Ok(Self::with_client(http_client, base_url))
    }

    pub fn with_client(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: super::trim_base_url(base_url.into()),
        }
    }
}

enum UploadStep {
    Sent(u64),
    Finished(Result<reqwest::Response, reqwest::Error>),
}

impl BatchUploader for HttpBatchUploader {
    fn upload(&self, batch: &UploadBatch) -> BatchEventStream {
        let client = self.http_client.clone();
        let url = format!("{}/api/roms/upload", self.base_url);
        let platform_id = batch.platform_id;
        let files: Vec<RomFile> = batch.files.iter().map(|c| c.file.clone()).collect();

        Box::pin(async_stream::stream! {
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<u64>();
            let mut form = Form::new().text("platform_id", platform_id.to_string());
            let mut bytes_total = 0u64;
            let mut read_error = None;

            for file in &files {
                match file_body(file, progress_tx.clone()).await {
                    Ok((body, len)) => {
                        bytes_total += len;
                        let part = Part::stream_with_length(body, len).file_name(file.name.clone());
                        form = form.part("files", part);
                    }
                    Err(e) => {
                        read_error = Some(format!("Failed to read {}: {}", file.name, e));
                        break;
                    }
                }
            }
            drop(progress_tx);

            if let Some(message) = read_error {
                tracing::warn!(platform_id, error = %message, "Batch aborted before sending");
                yield BatchEvent::Failed(message);
                return;
            }

            tracing::debug!(
                platform_id,
                files = files.len(),
                bytes_total,
                url = %url,
                "Sending upload batch"
            );

            let request = client.post(&url).multipart(form).send();
            tokio::pin!(request);

            let mut bytes_transferred = 0u64;
            let outcome = loop {
                let step = tokio::select! {
                    Some(sent) = progress_rx.recv() => UploadStep::Sent(sent),
                    result = &mut request => UploadStep::Finished(result),
                };
                match step {
                    UploadStep::Sent(sent) => {
                        bytes_transferred += sent;
                        yield BatchEvent::Progress { bytes_transferred, bytes_total };
                    }
                    UploadStep::Finished(result) => break result,
                }
            };

            let response = match outcome {
                Ok(response) => response,
                Err(e) => {
                    yield BatchEvent::Failed(NetworkError::from(e).to_string());
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                yield BatchEvent::Failed(NetworkError::Api(status.as_u16(), error_text).to_string());
                return;
            }

            match response.json::<UploadResponse>().await {
                Ok(body) => {
                    tracing::info!(platform_id, results = body.results.len(), "Upload batch answered");
                    yield BatchEvent::Progress { bytes_transferred: bytes_total, bytes_total };
                    yield BatchEvent::Results(body.results);
                }
                Err(e) => {
                    yield BatchEvent::Failed(NetworkError::Parse(e.to_string()).to_string());
                }
            }
        })
    }
}

/// Request body for one file, with its length
///
/// Disk-backed files are streamed from an open handle, never buffered
/// whole; the length is the size recorded at intake.
async fn file_body(
    file: &RomFile,
    progress: mpsc::UnboundedSender<u64>,
) -> std::io::Result<(reqwest::Body, u64)> {
    match file.path() {
        Some(path) => {
            let handle = tokio::fs::File::open(path).await?;
            Ok((disk_body(handle, progress), file.size))
        }
        None => {
            let content = file.read_all().await?;
            let len = content.len() as u64;
            Ok((memory_body(content, progress), len))
        }
    }
}

/// Streamed file body that reports each chunk as it is read
fn disk_body(handle: tokio::fs::File, progress: mpsc::UnboundedSender<u64>) -> reqwest::Body {
    let body = ReaderStream::with_capacity(handle, UPLOAD_CHUNK_BYTES).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            let _ = progress.send(bytes.len() as u64);
        }
        chunk
    });
    reqwest::Body::wrap_stream(body)
}

/// Chunked in-memory body that reports each chunk as it is pulled
fn memory_body(content: Vec<u8>, progress: mpsc::UnboundedSender<u64>) -> reqwest::Body {
    let chunks: Vec<Vec<u8>> = content.chunks(UPLOAD_CHUNK_BYTES).map(<[u8]>::to_vec).collect();
    let body = stream::iter(chunks).map(move |chunk| {
        let _ = progress.send(chunk.len() as u64);
        Ok::<_, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let body: UploadResponse = serde_json::from_str(
            r#"{"results": [
                {"filename": "a.nes", "success": true},
                {"filename": "b.nes", "success": false, "message": "Bad header"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(body.results[0], PerFileResult::ok("a.nes"));
        assert_eq!(body.results[1], PerFileResult::err("b.nes", "Bad header"));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_batch() {
        use crate::models::UploadCandidate;
        use romhold_common::events::CandidateId;

        // Port 9 (discard) on localhost is almost never listening
        let uploader = HttpBatchUploader::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let batch = UploadBatch {
            platform_id: 1,
            files: vec![UploadCandidate::new(
                CandidateId(0),
                RomFile::from_bytes("a.nes", vec![1u8; 10], 0),
            )],
        };

        let events: Vec<BatchEvent> = uploader.upload(&batch).collect().await;
        assert!(matches!(events.last(), Some(BatchEvent::Failed(_))));
    }
}
