//! Layered configuration: defaults → YAML file → `VMWATCH_` env → CLI flags.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::monitor_service::MonitorSettings;
use crate::domain::severity::SeverityThresholds;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub severity: SeverityThresholds,
    #[serde(default)]
    pub backups: BackupsConfig,
    /// Named daemons for `vmwatch query --node`.
    #[serde(default)]
    pub nodes: HashMap<String, NodeTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Backup inventory API (`GET /veeam`).
    pub backups_url: String,
    /// Inventory and monitoring API (`/vm`, `/status`, `/monitor/ping`).
    pub monitor_url: String,
    /// Single-address ping API (`POST /ping-status`).
    pub ping_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
    /// Concurrent checks during an inventory sweep.
    pub sweep_concurrency: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            backups_url: "http://127.0.0.1:8000".to_string(),
            monitor_url: "http://127.0.0.1:8000".to_string(),
            ping_url: "http://127.0.0.1:8000".to_string(),
            auth_token: None,
            timeout_secs: 15,
            sweep_concurrency: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub http_addr: String,
    pub log_level: String,
    /// Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    pub live_poll_secs: u64,
    pub refresh_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:9300".to_string(),
            log_level: "info".to_string(),
            cors_origins: Vec::new(),
            live_poll_secs: 5,
            refresh_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupsConfig {
    /// A VM counts as working if it had a full or incremental backup this
    /// many days back (inclusive).
    pub recent_window_days: i64,
}

impl Default for BackupsConfig {
    fn default() -> Self {
        Self {
            recent_window_days: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTarget {
    pub url: String,
}

impl Config {
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            thresholds: self.severity,
            recent_window_days: self.backups.recent_window_days,
        }
    }

    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("vmwatch").join("config.yaml"))
    }
}

/// Load from `path` or the default location. A missing file is not an error.
pub fn load(path: Option<&str>) -> Result<Config> {
    let path = match path {
        Some(p) => PathBuf::from(p),
        None => Config::path()?,
    };
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<Config> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(path))
        .merge(Env::prefixed("VMWATCH_").split("__"))
        .extract()
        .with_context(|| format!("loading config from {}", path.display()))
}
