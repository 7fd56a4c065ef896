//! HTTP collaborators against a stub store
//!
//! Each test binds an axum router to an ephemeral port and points the real
//! client at it.

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use romhold_common::events::CandidateId;
use romhold_ingest::clients::{
    BatchUploader, DuplicateOracle, HttpBatchUploader, HttpDuplicateOracle, HttpPlatformRegistry,
    PlatformRegistry,
};
use romhold_ingest::error::NetworkError;
use romhold_ingest::models::{BatchEvent, RomFile, UploadBatch, UploadCandidate};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Serve `app` on 127.0.0.1 and return its base URL
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn batch(platform_id: i64, files: &[(&str, &[u8])]) -> UploadBatch {
    UploadBatch {
        platform_id,
        files: files
            .iter()
            .enumerate()
            .map(|(i, (name, content))| {
                UploadCandidate::new(CandidateId(i), RomFile::from_bytes(*name, content.to_vec(), 0))
            })
            .collect(),
    }
}

async fn collect(uploader: &HttpBatchUploader, batch: &UploadBatch) -> Vec<BatchEvent> {
    uploader.upload(batch).collect().await
}

#[tokio::test]
async fn test_oracle_reports_existing_record() {
    let app = Router::new().route(
        "/api/roms/check-hash/:hash",
        get(|Path(hash): Path<String>| async move {
            if hash == "abc123" {
                Json(json!({ "exists": true, "rom_id": 42 }))
            } else {
                Json(json!({ "exists": false }))
            }
        }),
    );
    let base = serve(app).await;
    let oracle = HttpDuplicateOracle::new(format!("{}/", base), TIMEOUT).unwrap();

    let known = oracle.check("abc123").await.unwrap();
    assert!(known.is_duplicate);
    assert_eq!(known.existing_record_ref.as_deref(), Some("42"));

    let unknown = oracle.check("ffff").await.unwrap();
    assert!(!unknown.is_duplicate);
    assert!(unknown.existing_record_ref.is_none());
}

#[tokio::test]
async fn test_oracle_surfaces_server_errors() {
    let app = Router::new().route(
        "/api/roms/check-hash/:hash",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database locked") }),
    );
    let base = serve(app).await;
    let oracle = HttpDuplicateOracle::new(base, TIMEOUT).unwrap();

    match oracle.check("abc").await {
        Err(NetworkError::Api(status, body)) => {
            assert_eq!(status, 500);
            assert_eq!(body, "database locked");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_registry_requests_active_platforms() {
    let app = Router::new().route(
        "/api/platforms",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            assert_eq!(params.get("active").map(String::as_str), Some("true"));
            Json(json!([
                { "id": 1, "name": "NES", "extensions": ["nes"] },
                { "id": 2, "name": "SNES", "file_extensions": "[\"snes\", \"smc\"]" },
                { "id": 3, "name": "Game Boy", "file_extension": ".gb" },
                { "id": 4, "name": "Lynx", "file_extensions": ["lnx", "lyx"] },
                { "name": "record without id" }
            ]))
        }),
    );
    let base = serve(app).await;
    let registry = HttpPlatformRegistry::new(base, TIMEOUT).unwrap();

    let platforms = registry.list_active().await.unwrap();
    // One bad record is dropped, the rest of the snapshot survives
    assert_eq!(platforms.len(), 4);
    assert_eq!(platforms[1].resolve_extensions(), vec!["snes", "smc"]);
    assert_eq!(platforms[2].resolve_extensions(), vec!["gb"]);
    assert_eq!(platforms[3].resolve_extensions(), vec!["lnx", "lyx"]);
}

#[tokio::test]
async fn test_registry_rejects_malformed_body() {
    let app = Router::new().route("/api/platforms", get(|| async { "not json" }));
    let base = serve(app).await;
    let registry = HttpPlatformRegistry::new(base, TIMEOUT).unwrap();

    assert!(matches!(registry.list_active().await, Err(NetworkError::Parse(_))));
}

#[tokio::test]
async fn test_uploader_sends_multipart_batch() {
    let app = Router::new().route(
        "/api/roms/upload",
        post(|mut multipart: Multipart| async move {
            let mut platform_id = String::new();
            let mut results = Vec::new();
            while let Some(field) = multipart.next_field().await.unwrap() {
                let field_name = field.name().map(str::to_string);
                match field_name.as_deref() {
                    Some("platform_id") => platform_id = field.text().await.unwrap(),
                    Some("files") => {
                        let name = field.file_name().unwrap_or_default().to_string();
                        let bytes = field.bytes().await.unwrap();
                        if bytes.is_empty() {
                            results.push(json!({ "filename": name, "success": false, "message": "Empty file" }));
                        } else {
                            results.push(json!({ "filename": name, "success": true }));
                        }
                    }
                    _ => {}
                }
            }
            assert_eq!(platform_id, "7");
            Json(json!({ "results": results }))
        }),
    );
    let base = serve(app).await;
    let uploader = HttpBatchUploader::new(base, TIMEOUT).unwrap();

    let events = collect(&uploader, &batch(7, &[("a.nes", b"abc"), ("empty.nes", b"")])).await;

    let Some(BatchEvent::Results(results)) = events.last() else {
        panic!("expected results, got {:?}", events);
    };
    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert_eq!(results[0].filename, "a.nes");
    assert!(!results[1].success);
    assert_eq!(results[1].message.as_deref(), Some("Empty file"));

    // Progress reaches the batch total before the verdict
    let progress: Vec<(u64, u64)> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress { bytes_transferred, bytes_total } => Some((*bytes_transferred, *bytes_total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress.last().copied(), Some((3, 3)));
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[tokio::test]
async fn test_uploader_maps_rejected_request_to_batch_failure() {
    let app = Router::new().route(
        "/api/roms/upload",
        post(|_body: Bytes| async { (StatusCode::PAYLOAD_TOO_LARGE, "batch too large") }),
    );
    let base = serve(app).await;
    let uploader = HttpBatchUploader::new(base, TIMEOUT).unwrap();

    let events = collect(&uploader, &batch(1, &[("a.nes", b"abc")])).await;

    match events.last() {
        Some(BatchEvent::Failed(message)) => {
            assert!(message.contains("413"), "unexpected message: {}", message);
            assert!(message.contains("batch too large"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!events.iter().any(|e| matches!(e, BatchEvent::Results(_))));
}

#[tokio::test]
async fn test_uploader_rejects_unparseable_answer() {
    let app = Router::new().route("/api/roms/upload", post(|_body: Bytes| async { Json(json!({ "ok": true })) }));
    let base = serve(app).await;
    let uploader = HttpBatchUploader::new(base, TIMEOUT).unwrap();

    let events = collect(&uploader, &batch(1, &[("a.nes", b"abc")])).await;

    assert!(matches!(events.last(), Some(BatchEvent::Failed(_))));
}

#[tokio::test]
async fn test_uploader_outlasts_short_deadline() {
    let app = Router::new().route(
        "/api/roms/upload",
        post(|_body: Bytes| async {
            tokio::time::sleep(Duration::from_millis(600)).await;
            Json(json!({ "results": [{ "filename": "slow.iso", "success": true }] }))
        }),
    );
    let base = serve(app).await;
    // A response slower than the connect timeout is still awaited
    let uploader = HttpBatchUploader::new(base, Duration::from_millis(200)).unwrap();

    let events = collect(&uploader, &batch(1, &[("slow.iso", b"iso")])).await;

    let Some(BatchEvent::Results(results)) = events.last() else {
        panic!("expected results, got {:?}", events);
    };
    assert!(results[0].success);
}

#[tokio::test]
async fn test_uploader_streams_files_from_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let path = dir.path().join("big.sfc");
    std::fs::write(&path, &content).unwrap();
    let expected_len = content.len();

    let app = Router::new().route(
        "/api/roms/upload",
        post(move |mut multipart: Multipart| async move {
            let mut results = Vec::new();
            while let Some(field) = multipart.next_field().await.unwrap() {
                if field.name() == Some("files") {
                    let name = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await.unwrap();
                    results.push(json!({ "filename": name, "success": bytes.len() == expected_len }));
                }
            }
            Json(json!({ "results": results }))
        }),
    );
    let base = serve(app).await;
    let uploader = HttpBatchUploader::new(base, TIMEOUT).unwrap();
    let file = RomFile::from_path(&path).await.unwrap();
    let batch = UploadBatch {
        platform_id: 2,
        files: vec![UploadCandidate::new(CandidateId(0), file)],
    };

    let events = collect(&uploader, &batch).await;

    let Some(BatchEvent::Results(results)) = events.last() else {
        panic!("expected results, got {:?}", events);
    };
    assert_eq!(results[0].filename, "big.sfc");
    assert!(results[0].success, "server saw a truncated body");
    let total = expected_len as u64;
    assert!(events.iter().any(|e| matches!(
        e,
        BatchEvent::Progress { bytes_transferred, bytes_total } if *bytes_transferred == total && *bytes_total == total
    )));
}
