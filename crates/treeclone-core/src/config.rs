use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checksum::HashAlgorithm;

/// Default ceiling on the share of scheduled entries allowed to fail in the initial pass.
pub const DEFAULT_MAX_RETRY_PERCENT: f64 = 25.0;

/// Transport tuning (optional `[transport]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds (HEAD and GET).
    pub timeout_secs: u64,
    /// Value sent as `User-Agent`.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            timeout_secs: 300,
            user_agent: format!("treeclone/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Global configuration loaded from `~/.config/treeclone/config.toml`.
///
/// Source and destination are per-invocation and live on [`crate::engine::JobSettings`];
/// this file holds the knobs that rarely change between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneConfig {
    /// Number of worker threads performing fetch + store.
    pub concurrency: usize,
    /// Abort before the retry pass when more than this percentage of scheduled entries failed.
    pub max_retry_percent: f64,
    /// Never re-check entries that already exist locally.
    #[serde(default)]
    pub skip_existing: bool,
    /// Re-fetch entries that already exist locally without comparing fingerprints.
    #[serde(default)]
    pub force_updates: bool,
    /// Local fingerprint used when the manifest has no `file_hash` column.
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    /// Status snapshot interval in milliseconds.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_status_interval_ms() -> u64 {
    1000
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_retry_percent: DEFAULT_MAX_RETRY_PERCENT,
            skip_existing: false,
            force_updates: false,
            hash_algorithm: HashAlgorithm::default(),
            status_interval_ms: default_status_interval_ms(),
            transport: TransportConfig::default(),
        }
    }
}

impl CloneConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.max(1))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if !self.max_retry_percent.is_finite() || self.max_retry_percent < 0.0 {
            anyhow::bail!(
                "max_retry_percent must be a non-negative number, got {}",
                self.max_retry_percent
            );
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("treeclone")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from an explicit path. Missing file is an error.
pub fn load_from_path(path: &Path) -> Result<CloneConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: CloneConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<CloneConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = CloneConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from_path(&path)
}
