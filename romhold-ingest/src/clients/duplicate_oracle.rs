//! Duplicate oracle: asks the store whether content already exists

use crate::error::NetworkError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Oracle verdict for one fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    /// Reference to the stored record with matching content
    pub existing_record_ref: Option<String>,
}

impl DuplicateCheck {
    pub fn unique() -> Self {
        Self::default()
    }

    pub fn duplicate_of(record: impl Into<String>) -> Self {
        Self {
            is_duplicate: true,
            existing_record_ref: Some(record.into()),
        }
    }
}

/// Fingerprint → "does matching content already exist"
#[async_trait]
pub trait DuplicateOracle: Send + Sync {
    async fn check(&self, fingerprint: &str) -> Result<DuplicateCheck, NetworkError>;
}

/// Wire shape of `GET /api/roms/check-hash/{fingerprint}`
#[derive(Debug, Deserialize)]
struct CheckHashResponse {
    exists: bool,
    #[serde(default)]
    rom_id: Option<i64>,
}

/// Oracle backed by the store's HTTP API
pub struct HttpDuplicateOracle {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpDuplicateOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let http_client = reqwest::Client::builder()
            .user_agent(super::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        Ok(Self::with_client(http_client, base_url))
    }

    /// Share an existing client (connection pool) with other collaborators
    pub fn with_client(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: super::trim_base_url(base_url.into()),
        }
    }
}

#[async_trait]
impl DuplicateOracle for HttpDuplicateOracle {
    async fn check(&self, fingerprint: &str) -> Result<DuplicateCheck, NetworkError> {
        let url = format!("{}/api/roms/check-hash/{}", self.base_url, fingerprint);

        tracing::debug!(fingerprint = %fingerprint, url = %url, "Checking for duplicate content");

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(NetworkError::Api(status.as_u16(), error_text));
        }

        let body: CheckHashResponse = response
            .json()
            .await
            .map_err(|e| NetworkError::Parse(e.to_string()))?;

        Ok(DuplicateCheck {
            is_duplicate: body.exists,
            existing_record_ref: body.rom_id.filter(|_| body.exists).map(|id| id.to_string()),
        })
    }
}
