//! Platform registry: the list of active platforms and their extensions
//!
//! One snapshot is taken per run. [`HttpPlatformRegistry`] asks the store;
//! [`StaticPlatformRegistry`] serves a fixed list (offline use, tests).

use crate::error::NetworkError;
use crate::models::platform::decode_platforms;
use crate::models::Platform;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Source of the active platform list
#[async_trait]
pub trait PlatformRegistry: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Platform>, NetworkError>;
}

/// Registry backed by the store's HTTP API
pub struct HttpPlatformRegistry {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpPlatformRegistry {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let http_client = reqwest::Client::builder()
            .user_agent(super::USER_AGENT)
            .timeout(timeout)
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

#[async_trait]
impl PlatformRegistry for HttpPlatformRegistry {
    async fn list_active(&self) -> Result<Vec<Platform>, NetworkError> {
        let url = format!("{}/api/platforms", self.base_url);

        tracing::debug!(url = %url, "Fetching active platforms");

        let response = self
            .http_client
            .get(&url)
            .query(&[("active", "true")])
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(NetworkError::Api(status.as_u16(), error_text));
        }

        let records: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| NetworkError::Parse(e.to_string()))?;
        let platforms = decode_platforms(records);

        tracing::info!(count = platforms.len(), "Retrieved platform registry");

        Ok(platforms)
    }
}

/// Fixed platform list
#[derive(Debug, Clone, Default)]
pub struct StaticPlatformRegistry {
    platforms: Vec<Platform>,
}

impl StaticPlatformRegistry {
    pub fn new(platforms: Vec<Platform>) -> Self {
        Self { platforms }
    }

    /// Load the same JSON the HTTP endpoint serves from a file
    pub fn from_file(path: &Path) -> romhold_common::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let platforms = decode_platforms(serde_json::from_str(&content)?);
        tracing::debug!(path = %path.display(), count = platforms.len(), "Loaded platform registry file");
        Ok(Self::new(platforms))
    }
}

#[async_trait]
impl PlatformRegistry for StaticPlatformRegistry {
    async fn list_active(&self) -> Result<Vec<Platform>, NetworkError> {
        Ok(self.platforms.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_registry_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("platforms.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "name": "NES", "extensions": ["nes"]},
                {"id": 2, "name": "SNES", "file_extensions": "[\"snes\", \"smc\"]"}]"#,
        )
        .unwrap();

        let registry = StaticPlatformRegistry::from_file(&path).unwrap();
        let platforms = registry.list_active().await.unwrap();
        assert_eq!(platforms.len(), 2);
        assert_eq!(platforms[1].name, "SNES");
    }

    #[test]
    fn test_static_registry_skips_only_malformed_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("platforms.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "name": "NES", "extensions": ["nes"]},
                {"id": 2, "name": "SNES", "file_extensions": ["snes", "smc"]},
                {"id": null, "name": "Ghost"}]"#,
        )
        .unwrap();

        let registry = StaticPlatformRegistry::from_file(&path).unwrap();
        let ids: Vec<i64> = registry.platforms.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(registry.platforms[1].resolve_extensions(), vec!["snes", "smc"]);
    }

    #[test]
    fn test_static_registry_bad_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("platforms.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            StaticPlatformRegistry::from_file(&path),
            Err(romhold_common::Error::Json(_))
        ));
    }
}
