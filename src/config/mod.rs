//! # Sync Service Configuration
//!
//! YAML-based configuration with per-environment overrides, loaded through
//! [`ConfigManager`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hint_sync::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let queue_name = &manager.config().queue.name;
//! let lock_ttl = manager.config().lock.ttl();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring hint-sync.yaml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Job storage connection settings
    pub database: DatabaseConfig,
    /// Results queue settings
    pub queue: QueueConfig,
    /// Per-job lease settings
    pub lock: LockConfig,
    /// Batch processing settings
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/hint_sync_development".to_string(),
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    /// Database URL with any password masked, safe for logs
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        let Some((credentials, host)) = rest.rsplit_once('@') else {
            return self.url.clone();
        };
        match credentials.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
            None => self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// pgmq queue the workers publish results to
    pub name: String,
    /// Messages read per delivery
    pub batch_size: i32,
    /// Seconds a read message stays invisible to other readers
    pub visibility_timeout_seconds: i32,
    /// Sleep between polls when the queue is empty
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "scan_results".to_string(),
            batch_size: 10,
            visibility_timeout_seconds: 300, // 5 minutes
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lease lifetime; a crashed holder's lock frees itself after this
    pub ttl_seconds: u64,
    /// Acquire attempts before giving up on a contended job
    pub max_attempts: u32,
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 60,
            max_attempts: 50,
            retry_interval_ms: 100,
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Job groups from one batch processed at the same time
    pub max_concurrent_groups: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_concurrent_groups: 8,
        }
    }
}

impl SyncConfig {
    /// Reject values that would stall or break the service
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "database.url",
                "",
                "database url must not be empty",
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "at least one connection is required",
            ));
        }
        if self.queue.name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "queue.name",
                "",
                "queue name must not be empty",
            ));
        }
        if self.queue.batch_size <= 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.batch_size",
                self.queue.batch_size.to_string(),
                "batch size must be positive",
            ));
        }
        if self.queue.visibility_timeout_seconds <= 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.visibility_timeout_seconds",
                self.queue.visibility_timeout_seconds.to_string(),
                "visibility timeout must be positive",
            ));
        }
        if self.lock.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "lock.max_attempts",
                "0",
                "at least one acquire attempt is required",
            ));
        }
        if self.lock.ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "lock.ttl_seconds",
                "0",
                "a zero ttl would expire every lease immediately",
            ));
        }
        if self.sync.max_concurrent_groups == 0 {
            return Err(ConfigurationError::invalid_value(
                "sync.max_concurrent_groups",
                "0",
                "at least one group must be able to run",
            ));
        }
        Ok(())
    }
}
