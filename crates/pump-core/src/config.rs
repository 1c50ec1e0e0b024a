//! Configuration system for the pump.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PUMP_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/pump/config.toml
//!   3. ~/.config/pump/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::extension::ExtensionPoint;
use crate::wire::Generation;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    pub transfer: TransferSettings,
    pub daemon: DaemonSettings,
    /// Plugins loaded in order at start-up.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Local root directory files are written under.
    pub destination: PathBuf,
    /// Bytes per write while streaming a response body.
    pub buffer_size: usize,
    /// Requested chunk size when planning partitions. <= 1 = whole file.
    pub block_size: i64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Credential override; URL userinfo is used otherwise.
    pub user: Option<String>,
    pub password: Option<String>,
    /// Write partitioned blocks straight into the target file.
    pub inplace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Instance number handed to hooks.
    pub instance: u32,
    pub cache_dir: PathBuf,
    /// Re-post processed messages on stdout in this generation. None = don't.
    pub post_generation: Option<Generation>,
}

/// One `[[plugins]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub point: ExtensionPoint,
    pub source: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            destination: data_dir().join("files"),
            buffer_size: 65_536,
            block_size: 0,
            timeout_secs: 30,
            user: None,
            password: None,
            inplace: true,
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            instance: 1,
            cache_dir: cache_dir(),
            post_generation: None,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("pump")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("pump")
}

fn cache_dir() -> PathBuf {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".cache"))
        .join("pump")
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

impl PumpConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from an explicit file, defaults when it does not exist. No env
    /// overrides are applied.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(PumpConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PUMP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    pub fn write_default_to(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text =
            toml::to_string_pretty(&PumpConfig::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply PUMP_* overrides read through `var`. Unparseable numbers are
    /// ignored.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("PUMP_TRANSFER__DESTINATION") {
            self.transfer.destination = PathBuf::from(v);
        }
        if let Some(v) = var("PUMP_TRANSFER__BUFFER_SIZE") {
            if let Ok(n) = v.parse() {
                self.transfer.buffer_size = n;
            }
        }
        if let Some(v) = var("PUMP_TRANSFER__BLOCK_SIZE") {
            if let Ok(n) = v.parse() {
                self.transfer.block_size = n;
            }
        }
        if let Some(v) = var("PUMP_TRANSFER__TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.transfer.timeout_secs = n;
            }
        }
        if let Some(v) = var("PUMP_TRANSFER__USER") {
            self.transfer.user = Some(v);
        }
        if let Some(v) = var("PUMP_TRANSFER__PASSWORD") {
            self.transfer.password = Some(v);
        }
        if let Some(v) = var("PUMP_DAEMON__INSTANCE") {
            if let Ok(n) = v.parse() {
                self.daemon.instance = n;
            }
        }
    }
}
