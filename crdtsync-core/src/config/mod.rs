//! Configuration management for crdtsync
//!
//! Defaults, TOML file loading, `CRDTSYNC_<SECTION>_<KEY>` environment
//! overrides, and validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

use crate::core_sync::conflict::AUTOMATIC_STRATEGY;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Synchronizer configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Stable identifier of the local replica
    pub replica_id: String,

    /// Periodic sync cadence
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,

    /// Capacity of the propagation buffer
    pub max_pending_operations: usize,

    /// History length above which a CRDT is compacted
    pub compaction_threshold: usize,

    /// Operations kept per CRDT after compaction
    pub compaction_retain: usize,

    /// Last-seen age after which a replica counts as unreachable
    #[serde(with = "humantime_serde")]
    pub staleness_timeout: Duration,

    /// Upper bound for a single exchange with a peer
    #[serde(with = "humantime_serde")]
    pub exchange_timeout: Duration,

    /// Minimum reachable ratio of known replicas before a partition is flagged
    pub partition_threshold: f64,

    /// Strategy used for conflicts detected while merging
    pub default_strategy: String,

    /// Replica ranking for the replica-priority strategy, highest first
    pub replica_priorities: Vec<String>,

    /// Completed sessions kept for inspection
    pub max_session_history: usize,

    /// Conflict resolution records kept in the audit trail
    pub max_resolution_history: usize,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory used by the file-backed key-value store
    pub data_dir: PathBuf,

    /// Optional TTL applied to persisted snapshots
    #[serde(with = "humantime_serde")]
    pub snapshot_ttl: Option<Duration>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            replica_id: uuid::Uuid::new_v4().to_string(),
            sync_interval: Duration::from_secs(5),
            max_pending_operations: 1000,
            compaction_threshold: 100,
            compaction_retain: 50,
            staleness_timeout: Duration::from_secs(30),
            exchange_timeout: Duration::from_secs(10),
            partition_threshold: 0.7,
            default_strategy: AUTOMATIC_STRATEGY.to_string(),
            replica_priorities: Vec::new(),
            max_session_history: 100,
            max_resolution_history: 1000,
        }
    }
}

impl SyncConfig {
    /// Default configuration for a named replica
    pub fn for_replica(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replica_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "replica_id must not be empty".to_string(),
            ));
        }

        if self.max_pending_operations == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_pending_operations must be greater than 0".to_string(),
            ));
        }

        if self.compaction_retain == 0 || self.compaction_threshold == 0 {
            return Err(ConfigError::ValidationFailed(
                "compaction_threshold and compaction_retain must be greater than 0".to_string(),
            ));
        }

        if self.compaction_retain > self.compaction_threshold {
            return Err(ConfigError::ValidationFailed(format!(
                "compaction_retain ({}) must not exceed compaction_threshold ({})",
                self.compaction_retain, self.compaction_threshold
            )));
        }

        if !(self.partition_threshold > 0.0 && self.partition_threshold <= 1.0) {
            return Err(ConfigError::ValidationFailed(format!(
                "partition_threshold must be in (0, 1], got {}",
                self.partition_threshold
            )));
        }

        if self.sync_interval.is_zero() || self.exchange_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "sync_interval and exchange_timeout must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            snapshot_ttl: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

fn parse_env_duration(key: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(raw) => humantime_serde::re::humantime::parse_duration(&raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: CRDTSYNC_<SECTION>_<KEY>
    /// Example: CRDTSYNC_SYNC_REPLICA_ID=replica-a
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables on top of the current values
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(replica_id) = env::var("CRDTSYNC_SYNC_REPLICA_ID") {
            self.sync.replica_id = replica_id;
        }
        if let Some(interval) = parse_env_duration("CRDTSYNC_SYNC_INTERVAL")? {
            self.sync.sync_interval = interval;
        }
        if let Some(max) = parse_env("CRDTSYNC_SYNC_MAX_PENDING_OPERATIONS")? {
            self.sync.max_pending_operations = max;
        }
        if let Some(threshold) = parse_env("CRDTSYNC_SYNC_COMPACTION_THRESHOLD")? {
            self.sync.compaction_threshold = threshold;
        }
        if let Some(retain) = parse_env("CRDTSYNC_SYNC_COMPACTION_RETAIN")? {
            self.sync.compaction_retain = retain;
        }
        if let Some(timeout) = parse_env_duration("CRDTSYNC_SYNC_STALENESS_TIMEOUT")? {
            self.sync.staleness_timeout = timeout;
        }
        if let Some(timeout) = parse_env_duration("CRDTSYNC_SYNC_EXCHANGE_TIMEOUT")? {
            self.sync.exchange_timeout = timeout;
        }
        if let Some(ratio) = parse_env("CRDTSYNC_SYNC_PARTITION_THRESHOLD")? {
            self.sync.partition_threshold = ratio;
        }
        if let Ok(strategy) = env::var("CRDTSYNC_SYNC_DEFAULT_STRATEGY") {
            self.sync.default_strategy = strategy;
        }
        if let Ok(priorities) = env::var("CRDTSYNC_SYNC_REPLICA_PRIORITIES") {
            self.sync.replica_priorities = priorities
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(data_dir) = env::var("CRDTSYNC_STORE_DATA_DIR") {
            self.store.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(level) = env::var("CRDTSYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_env("CRDTSYNC_LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync.validate()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}
