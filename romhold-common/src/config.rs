//! Configuration loading and config file resolution
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`<config_dir>/romhold/romhold.toml`)
//! 4. Compiled defaults (no file)
//!
//! A missing or unreadable TOML file never aborts startup: a warning is
//! logged and compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ROMHOLD_CONFIG";

/// Config file name inside the per-user config directory
pub const CONFIG_FILE_NAME: &str = "romhold.toml";

/// Largest file accepted for upload (2 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Remote ROM store connection settings
    #[serde(default)]
    pub server: ServerConfig,

    /// File acceptance limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Content hashing behaviour
    #[serde(default)]
    pub hashing: HashingConfig,

    /// Batch upload behaviour
    #[serde(default)]
    pub upload: UploadConfig,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote ROM store connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the ROM store, e.g. `http://localhost:8080`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds for lookups; uploads are not bounded by it
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds, applied to every request
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// File acceptance limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Files larger than this are rejected before hashing
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
}

/// Content hashing behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashingConfig {
    /// Use SHA-256; when false every file takes the weak fingerprint path
    #[serde(default = "default_true")]
    pub strong_digest: bool,

    /// Number of files hashed and duplicate-checked at once
    #[serde(default = "default_hash_concurrency")]
    pub concurrency: usize,
}

/// Batch upload behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum batches in flight at once (0 = all batches at once)
    #[serde(default)]
    pub max_concurrent_batches: usize,

    /// Minimum interval between progress events, in milliseconds
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_true() -> bool {
    true
}

fn default_hash_concurrency() -> usize {
    4
}

fn default_progress_interval_ms() -> u64 {
    250
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
        }
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            strong_digest: true,
            concurrency: default_hash_concurrency(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_batches: 0,
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Resolve which config file to read
///
/// Returns `None` when no explicit path was given and the per-user
/// config file does not exist.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config directory
    default_config_path().filter(|p| p.exists())
}

/// Per-user config file location for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("romhold").join(CONFIG_FILE_NAME))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load config with graceful degradation
///
/// Missing or invalid files log a warning and fall back to defaults.
pub fn load_or_default(cli_arg: Option<&Path>) -> TomlConfig {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using compiled defaults");
        return TomlConfig::default();
    };

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} - using compiled defaults", e);
            TomlConfig::default()
        }
    }
}

/// Write config to disk atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.limits.max_file_size_bytes, 2_147_483_648);
        assert!(config.hashing.strong_digest);
        assert_eq!(config.hashing.concurrency, 4);
        assert_eq!(config.upload.max_concurrent_batches, 0);
        assert_eq!(config.logging.level, "info");
        assert!(config.server.base_url.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [server]
            base_url = "http://roms.local"

            [hashing]
            strong_digest = false
            "#,
        )
        .unwrap();

        assert_eq!(config.server.base_url.as_deref(), Some("http://roms.local"));
        assert_eq!(config.server.request_timeout_secs, 300);
        assert_eq!(config.server.connect_timeout_secs, 30);
        assert!(!config.hashing.strong_digest);
        assert_eq!(config.hashing.concurrency, 4);
        assert_eq!(config.limits.max_file_size_bytes, DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn test_cli_path_wins() {
        let path = Path::new("/tmp/explicit-romhold.toml");
        assert_eq!(resolve_config_path(Some(path)), Some(path.to_path_buf()));
    }
}
