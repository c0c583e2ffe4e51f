use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::ConfigError;

/// Which notifications an observer wants from a storage proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryOptions {
    /// Keep a full local copy of the remote collection.
    pub keep_synced: bool,
    /// Receive the full model whenever the proxy (re)synchronises.
    pub notify_sync: bool,
    /// Receive per-update changes.
    pub notify_update: bool,
    /// Be told when the proxy falls behind.
    pub notify_desync: bool,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            keep_synced: true,
            notify_sync: true,
            notify_update: true,
            notify_desync: false,
        }
    }
}

impl DeliveryOptions {
    /// Options for an observer that only wants raw updates, without a local model.
    pub fn updates_only() -> Self {
        Self {
            keep_synced: false,
            notify_sync: false,
            notify_update: true,
            notify_desync: false,
        }
    }

    pub fn with_desync(mut self) -> Self {
        self.notify_desync = true;
        self
    }
}

/// Runtime configuration for a proxy host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Prefix for identifiers issued to proxies crossing the authority boundary.
    pub id_prefix: SmolStr,
    /// Options used when a handle registers without its own.
    pub default_options: DeliveryOptions,
    /// Bound on out-of-order updates held while waiting for a gap to fill.
    /// Exceeding it discards the queue and forces a resync.
    pub max_pending_updates: Option<usize>,
    /// Console level used when `RUST_LOG` is unset.
    pub log_level: SmolStr,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            id_prefix: SmolStr::new_static("p"),
            default_options: DeliveryOptions::default(),
            max_pending_updates: None,
            log_level: SmolStr::new_static("info"),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Optional env vars:
    /// - `STRAND_ID_PREFIX`: identifier prefix (default: `p`)
    /// - `STRAND_MAX_PENDING_UPDATES`: pending update bound (default: unbounded)
    /// - `STRAND_LOG_LEVEL`: console level (default: `info`)
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|var| std::env::var(var).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(prefix) = lookup("STRAND_ID_PREFIX") {
            config.id_prefix = prefix.into();
        }

        if let Some(raw) = lookup("STRAND_MAX_PENDING_UPDATES") {
            let bound = raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "STRAND_MAX_PENDING_UPDATES",
                value: raw.clone(),
            })?;
            config.max_pending_updates = Some(bound);
        }

        if let Some(level) = lookup("STRAND_LOG_LEVEL") {
            config.log_level = level.into();
        }

        Ok(config)
    }

    /// Load configuration from a file. Only `.json` is supported.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        FileStore::new(path).load()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        FileStore::new(path).save(self)
    }
}

/// Reads and writes a [`SyncConfig`] file, picking the format from the extension.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<SyncConfig, ConfigError> {
        self.check_format()?;
        let contents = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, config: &SyncConfig) -> Result<(), ConfigError> {
        self.check_format()?;
        let contents =
            serde_json::to_string_pretty(config).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;
        std::fs::write(&self.path, contents).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn check_format(&self) -> Result<(), ConfigError> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(()),
            _ => Err(ConfigError::UnsupportedFormat {
                path: self.path.clone(),
            }),
        }
    }
}
