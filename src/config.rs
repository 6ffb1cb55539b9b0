//! Configuration management
//!
//! Handles TOML configuration parsing and validation. Every field has a
//! default, so an empty file (or no file) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::dispatch::Backpressure;
use crate::models::MonitorError;

/// Main monitor configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub audit: AuditSettings,
    pub table: TableSettings,
    pub classifier: ClassifierSettings,
    pub dispatch: DispatchSettings,
}

/// Audit device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSettings {
    /// Audit pipe device path
    pub device: PathBuf,
    /// Preselection class mask (success and failure)
    pub class_mask: u32,
    /// Reader wake-up interval in milliseconds (10-5000)
    pub poll_interval_ms: u64,
    /// Insert already-running processes into the table at start
    pub seed_running_processes: bool,
}

/// Process table retention settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableSettings {
    /// Seconds an exited record stays queryable (0-86400)
    pub grace_period_secs: f64,
    /// Record count above which the oldest exited records are evicted
    pub capacity: usize,
}

/// Trust classification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierSettings {
    /// Worker threads (1-64)
    pub workers: usize,
    /// Queued plus running classifications before new ones are refused
    pub queue_limit: usize,
    /// Cached signing verdicts (0 disables the cache)
    pub cache_capacity: usize,
    /// Extract entitlements during classification instead of on demand
    pub eager_entitlements: bool,
    /// Bound on waiting for running classifications at stop
    pub shutdown_timeout_ms: u64,
}

/// Subscriber delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSettings {
    /// Bounded queue length per subscriber
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            device: PathBuf::from(AUDIT_PIPE),
            class_mask: DEFAULT_CLASS_MASK,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            seed_running_processes: false,
        }
    }
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            capacity: DEFAULT_TABLE_CAPACITY,
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_CLASSIFIER_WORKERS,
            queue_limit: DEFAULT_CLASSIFIER_QUEUE_LIMIT,
            cache_capacity: DEFAULT_SIGNING_CACHE_CAPACITY,
            eager_entitlements: false,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
            backpressure: Backpressure::default(),
        }
    }
}

impl MonitorConfig {
    /// Parse and validate a configuration document
    pub fn from_toml(content: &str) -> Result<Self, MonitorError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self, MonitorError> {
        let content = std::fs::read_to_string(path).map_err(|source| MonitorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// `~/.config/procinfo.toml` (or the platform equivalent)
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    /// Load the default config file when present, else defaults
    pub fn load_default() -> Result<Self, MonitorError> {
        match Self::default_config_path() {
            Some(path) if path.is_file() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        let invalid = |msg: String| Err(MonitorError::InvalidConfig(msg));

        if self.audit.class_mask == 0 {
            return invalid("audit.class_mask must select at least one class".to_string());
        }
        if !(10..=5_000).contains(&self.audit.poll_interval_ms) {
            return invalid(format!(
                "audit.poll_interval_ms must be between 10 and 5000, got {}",
                self.audit.poll_interval_ms
            ));
        }
        let grace = self.table.grace_period_secs;
        if !grace.is_finite() || !(0.0..=86_400.0).contains(&grace) {
            return invalid(format!("table.grace_period_secs must be between 0 and 86400, got {}", grace));
        }
        if self.table.capacity == 0 {
            return invalid("table.capacity must be positive".to_string());
        }
        if !(1..=64).contains(&self.classifier.workers) {
            return invalid(format!(
                "classifier.workers must be between 1 and 64, got {}",
                self.classifier.workers
            ));
        }
        if self.classifier.queue_limit == 0 {
            return invalid("classifier.queue_limit must be positive".to_string());
        }
        if self.dispatch.queue_capacity == 0 {
            return invalid("dispatch.queue_capacity must be positive".to_string());
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.audit.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs_f64(self.table.grace_period_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier.shutdown_timeout_ms)
    }
}
