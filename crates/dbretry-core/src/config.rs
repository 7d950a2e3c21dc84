use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{ConfiguredPolicy, ExponentialRetry, FixedRetry};

/// Delay shape between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay every time.
    #[default]
    Fixed,
    /// `delay_ms * 2^attempt`, capped at `max_delay_ms`.
    Exponential,
    /// Do not retry at all.
    None,
}

/// Retry policy parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    /// Delay between attempts in milliseconds (base delay for exponential).
    pub delay_ms: u64,
    #[serde(default)]
    pub backoff: Backoff,
    /// Upper bound for exponential delays in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    /// Ten retries three seconds apart: enough to ride out the connection
    /// resets a cloud SQL service issues while rebalancing.
    fn default() -> Self {
        Self {
            max_retries: 10,
            delay_ms: 3000,
            backoff: Backoff::Fixed,
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Build the always-retry policy described by this section.
    pub fn policy(&self) -> ConfiguredPolicy {
        match self.backoff {
            Backoff::None => ConfiguredPolicy::Never,
            Backoff::Fixed => ConfiguredPolicy::Fixed(FixedRetry::new(self.max_retries, self.delay())),
            Backoff::Exponential => ConfiguredPolicy::Exponential(ExponentialRetry::new(
                self.max_retries,
                self.delay(),
                Duration::from_millis(self.max_delay_ms),
            )),
        }
    }
}

/// Global configuration loaded from `~/.config/dbretry/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbRetryConfig {
    /// Connection string used by the connection provider.
    #[serde(default)]
    pub connection_string: Option<String>,
    /// Name of an entry in `connection_strings`, used when `connection_string` is unset.
    #[serde(default)]
    pub connection_string_name: Option<String>,
    /// Statements per batch before the batcher flushes.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Optional per-command timeout in seconds (None = driver default).
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    /// Named connection strings.
    #[serde(default)]
    pub connection_strings: BTreeMap<String, String>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_batch_size() -> usize {
    20
}

impl Default for DbRetryConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            connection_string_name: None,
            batch_size: default_batch_size(),
            command_timeout_secs: None,
            connection_strings: BTreeMap::new(),
            retry: None,
        }
    }
}

impl DbRetryConfig {
    /// Effective retry settings (the `[retry]` section or defaults).
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dbretry")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DbRetryConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DbRetryConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from(&path)
}

/// Load configuration from a specific file.
pub fn load_from(path: &Path) -> Result<DbRetryConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: DbRetryConfig = toml::from_str(&data)?;
    Ok(cfg)
}
