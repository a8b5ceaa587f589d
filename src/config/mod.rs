//! Fleet configuration loaded from a TOML file (`fleet.toml` by default).
//!
//! All sections except `[source]` are optional and fall back to their
//! defaults, so a minimal file only names the distribution endpoint and
//! the servers. Durations are humantime strings (`"30s"`, `"1h"`).

use crate::fingerprint::LevelSelector;
use crate::transport::Transport;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to read server list {path}: {source}")]
    ServerList {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No servers configured: set [fleet] servers or servers_file")]
    NoServers,

    #[error("No source of truth configured: set [source] http_url")]
    NoSource,
}

/// Source-of-truth endpoint (`[source]` table).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Base URL of the HTTP endpoint serving the model files and their
    /// ledger.
    pub http_url: String,
}

/// Fleet membership (`[fleet]` table).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FleetSection {
    /// Inline `user@host` entries.
    #[serde(default)]
    pub servers: Vec<String>,
    /// Optional plain-text server list, one `user@host` per line.
    #[serde(default)]
    pub servers_file: Option<PathBuf>,
    /// Model directory on every GPU server.
    #[serde(default = "default_models_path")]
    pub models_path: String,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            servers_file: None,
            models_path: default_models_path(),
        }
    }
}

fn default_models_path() -> String {
    "/mnt/models/official-models".to_string()
}

/// Transport budgets (`[transport]` table).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransportSection {
    #[serde(default = "default_connect_timeout", deserialize_with = "duration_str")]
    pub connect_timeout: Duration,
    #[serde(default = "default_command_timeout", deserialize_with = "duration_str")]
    pub command_timeout: Duration,
    #[serde(default = "default_download_timeout", deserialize_with = "duration_str")]
    pub download_timeout: Duration,
    /// Total attempts for a download whose verification fails.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            download_timeout: default_download_timeout(),
            attempts: default_attempts(),
        }
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_attempts() -> u32 {
    2
}

/// Sync policy (`[sync]` table).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SyncSection {
    /// Fingerprint tiers used to plan and verify downloads.
    #[serde(default = "default_sync_level")]
    pub level: LevelSelector,
    /// Server pool size in parallel mode.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Stop a server's sync at its first verification failure.
    #[serde(default)]
    pub halt_on_verification_failure: bool,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            level: default_sync_level(),
            max_parallel: default_max_parallel(),
            halt_on_verification_failure: false,
        }
    }
}

fn default_sync_level() -> LevelSelector {
    LevelSelector::L3
}

fn default_max_parallel() -> usize {
    4
}

/// Top-level fleet configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub fleet: FleetSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub sync: SyncSection,
}

impl FleetConfig {
    /// The distribution endpoint, required for sync.
    pub fn source(&self) -> Result<&SourceConfig, ConfigError> {
        self.source.as_ref().ok_or(ConfigError::NoSource)
    }

    /// Transport budgets as a transport handle.
    #[must_use]
    pub fn transport(&self) -> Transport {
        Transport {
            connect_timeout: self.transport.connect_timeout,
            command_timeout: self.transport.command_timeout,
            download_timeout: self.transport.download_timeout,
        }
    }

    /// The fleet server list: inline entries plus the optional file.
    pub fn resolve_servers(&self) -> Result<Vec<String>, ConfigError> {
        let mut servers = self.fleet.servers.clone();
        if let Some(file) = &self.fleet.servers_file {
            let content =
                std::fs::read_to_string(file).map_err(|e| ConfigError::ServerList {
                    path: file.display().to_string(),
                    source: e,
                })?;
            servers.extend(crate::fleet::parse_server_list(&content));
        }
        if servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        Ok(servers)
    }
}

/// Load the fleet configuration from `path`.
///
/// Unlike ledger loading this is strict: sync and count are meaningless
/// without a config, so a missing or malformed file is an error.
pub fn load_config(path: &Path) -> Result<FleetConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let config: FleetConfig = toml::from_str(&content).map_err(|e| ConfigError::Toml {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!("Loaded fleet config from {}", path.display());
    Ok(config)
}

fn duration_str<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}
