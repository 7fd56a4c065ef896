//! Configuration resolution for romhold
//!
//! Every setting is resolved with CLI → ENV → TOML → compiled default
//! priority. The TOML file itself is located by
//! [`romhold_common::config::resolve_config_path`].

use crate::services::{ContentHasher, FileValidator, OrchestratorOptions};
use romhold_common::config::{self as common_config, TomlConfig};
use romhold_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the store base URL
pub const SERVER_URL_ENV_VAR: &str = "ROMHOLD_SERVER_URL";

/// Environment variable overriding the log level
pub const LOG_LEVEL_ENV_VAR: &str = "ROMHOLD_LOG_LEVEL";

/// Environment variable toggling SHA-256 (`false`/`0`/`no`/`off` disables)
pub const STRONG_DIGEST_ENV_VAR: &str = "ROMHOLD_STRONG_DIGEST";

/// Store URL used when nothing is configured
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub server_url: Option<String>,
    /// `--weak-hash`: force the weak fingerprint path
    pub weak_hash: bool,
    pub log_level: Option<String>,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub server_url: String,
    pub request_timeout: Duration,
    /// Bounds connecting only; uploads may run longer than `request_timeout`
    pub connect_timeout: Duration,
    pub max_file_size: u64,
    pub strong_digest: bool,
    pub hash_concurrency: usize,
    pub max_concurrent_batches: usize,
    pub progress_interval: Duration,
    pub log_level: String,
    /// TOML file the settings came from, if any
    pub config_path: Option<PathBuf>,
}

impl IngestConfig {
    /// Resolve from the command line, process environment and TOML file
    pub fn resolve(cli: &CliOverrides) -> Self {
        let config_path = common_config::resolve_config_path(cli.config_path.as_deref());
        let toml_config = common_config::load_or_default(config_path.as_deref());
        let mut config = Self::from_sources(cli, &toml_config, |key| std::env::var(key).ok());
        config.config_path = config_path;
        config
    }

    /// Resolve from explicit sources
    ///
    /// `env` looks up environment variables; tests pass a closure instead of
    /// touching the process environment.
    pub fn from_sources(
        cli: &CliOverrides,
        toml_config: &TomlConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let server_url = resolve_server_url(
            cli.server_url.as_deref(),
            env(SERVER_URL_ENV_VAR).as_deref(),
            toml_config.server.base_url.as_deref(),
        );

        let log_level = cli
            .log_level
            .clone()
            .filter(|l| is_set(l))
            .or_else(|| env(LOG_LEVEL_ENV_VAR).filter(|l| is_set(l)))
            .unwrap_or_else(|| toml_config.logging.level.clone());

        let strong_digest = if cli.weak_hash {
            false
        } else {
            match env(STRONG_DIGEST_ENV_VAR).as_deref().map(parse_bool) {
                Some(Some(value)) => value,
                Some(None) => {
                    warn!("Ignoring unrecognized {} value", STRONG_DIGEST_ENV_VAR);
                    toml_config.hashing.strong_digest
                }
                None => toml_config.hashing.strong_digest,
            }
        };

        Self {
            server_url,
            request_timeout: Duration::from_secs(toml_config.server.request_timeout_secs),
            connect_timeout: Duration::from_secs(toml_config.server.connect_timeout_secs),
            max_file_size: toml_config.limits.max_file_size_bytes,
            strong_digest,
            hash_concurrency: toml_config.hashing.concurrency.max(1),
            max_concurrent_batches: toml_config.upload.max_concurrent_batches,
            progress_interval: Duration::from_millis(toml_config.upload.progress_interval_ms),
            log_level,
            config_path: None,
        }
    }

    pub fn validator(&self) -> FileValidator {
        FileValidator::new(self.max_file_size)
    }

    pub fn hasher(&self) -> ContentHasher {
        ContentHasher::new(self.strong_digest)
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            hash_concurrency: self.hash_concurrency,
            max_concurrent_batches: self.max_concurrent_batches,
            progress_interval: self.progress_interval,
        }
    }
}

/// Resolve the store base URL
///
/// **Priority:** CLI → ENV → TOML → default
pub fn resolve_server_url(cli: Option<&str>, env: Option<&str>, toml: Option<&str>) -> String {
    let candidates = [("command line", cli), ("environment", env), ("TOML", toml)];

    let sources: Vec<&str> = candidates
        .iter()
        .filter(|(_, value)| value.map(is_set).unwrap_or(false))
        .map(|(source, _)| *source)
        .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Server URL found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    for (source, value) in candidates {
        if let Some(url) = value.filter(|v| is_set(v)) {
            info!("Server URL loaded from {}", source);
            return url.trim().to_string();
        }
    }

    info!("No server URL configured, using {}", DEFAULT_SERVER_URL);
    DEFAULT_SERVER_URL.to_string()
}

/// Persist a server URL into the TOML file, keeping other settings
pub fn save_server_url(url: &str, toml_path: &Path) -> Result<()> {
    if !is_set(url) {
        return Err(Error::InvalidInput("Server URL must not be empty".to_string()));
    }

    let mut config = if toml_path.exists() {
        common_config::load_toml_config(toml_path)?
    } else {
        TomlConfig::default()
    };
    config.server.base_url = Some(url.trim().to_string());

    common_config::write_toml_config(&config, toml_path)?;
    info!("Server URL saved to {}", toml_path.display());
    Ok(())
}

fn is_set(value: &str) -> bool {
    !value.trim().is_empty()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
