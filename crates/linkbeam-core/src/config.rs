//! Configuration system for LinkBeam.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LINKBEAM_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/linkbeam/config.toml
//!   3. ~/.config/linkbeam/config.toml

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkBeamConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Human-readable label announced to peers. Empty = system hostname.
    pub device_name: String,
    /// File holding the stable device id. Generated on first run.
    pub device_id_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the HTTP API binds to.
    pub bind_addr: String,
    /// TCP port for the HTTP API. Announced to peers as part of the Peer record.
    pub api_port: u16,
    /// UDP port announcements are sent to and received on.
    pub discovery_port: u16,
    /// Destination of announcement datagrams.
    pub broadcast_addr: Ipv4Addr,
    pub announce_interval_secs: u64,
    /// A peer silent for longer than this is forgotten.
    pub peer_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory received files are written to.
    pub received_path: PathBuf,
    /// Max upload body size. 0 = unlimited.
    pub max_upload_bytes: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            device_id_path: config_dir().join("device_id"),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            api_port: 5000,
            discovery_port: 12346,
            broadcast_addr: Ipv4Addr::BROADCAST,
            announce_interval_secs: 5,
            peer_ttl_secs: 30,
            sweep_interval_secs: 1,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            received_path: data_dir().join("received"),
            max_upload_bytes: 0,
        }
    }
}

impl NetworkConfig {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs.max(1))
    }

    pub fn peer_ttl(&self) -> Duration {
        Duration::from_secs(self.peer_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("linkbeam")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("linkbeam")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LinkBeamConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            LinkBeamConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LINKBEAM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&LinkBeamConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply LINKBEAM_* overrides. `lookup` is `std::env::var` outside tests.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("LINKBEAM_IDENTITY__DEVICE_NAME") {
            self.identity.device_name = v;
        }
        if let Some(p) = lookup("LINKBEAM_NETWORK__API_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = p;
        }
        if let Some(p) = lookup("LINKBEAM_NETWORK__DISCOVERY_PORT").and_then(|v| v.parse().ok()) {
            self.network.discovery_port = p;
        }
        if let Some(a) = lookup("LINKBEAM_NETWORK__BROADCAST_ADDR").and_then(|v| v.parse().ok()) {
            self.network.broadcast_addr = a;
        }
        if let Some(t) = lookup("LINKBEAM_NETWORK__PEER_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.network.peer_ttl_secs = t;
        }
        if let Some(v) = lookup("LINKBEAM_STORAGE__RECEIVED_PATH") {
            self.storage.received_path = PathBuf::from(v);
        }
    }
}
