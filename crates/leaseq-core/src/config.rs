//! Configuration.
//!
//! Both structs deserialize from JSON with every field optional, so a
//! deployment only spells out what it changes:
//!
//! ```ignore
//! let config = QueueConfig::from_json_str(r#"{ "default_lease_secs": 600 }"#)?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::errors::QueueError;

/// One day. Must exceed the time a consumer needs to process and ack a
/// message, or the message may be delivered twice.
pub const DEFAULT_LEASE_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Per-queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Lease applied to messages sent without an explicit one.
    pub default_lease_secs: u64,
    /// `Queue::open` creates the table if missing.
    pub create_on_open: bool,
    /// `Queue::open` drops the table (every queue in it) before anything else.
    pub drop_on_open: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_lease_secs: DEFAULT_LEASE_SECS,
            create_on_open: true,
            drop_on_open: false,
        }
    }
}

impl QueueConfig {
    pub fn from_json_str(json: &str) -> Result<Self, QueueError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn default_lease(&self) -> Duration {
        Duration::from_secs(self.default_lease_secs)
    }

    pub fn with_default_lease(mut self, lease: Duration) -> Self {
        self.default_lease_secs = lease.as_secs();
        self
    }
}

/// Connection settings for `SqliteStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a transaction waits for a competing writer before failing.
    pub busy_timeout_ms: u64,
    /// Switch the database to write-ahead logging on open.
    pub wal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            wal: true,
        }
    }
}

impl StoreConfig {
    pub fn from_json_str(json: &str) -> Result<Self, QueueError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Polling consumers (`app::WorkerGroup`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub workers: usize,
    /// Pause after the queue was observed empty or a message failed.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = QueueConfig::default();
        assert_eq!(config.default_lease(), Duration::from_secs(86_400));
        assert!(config.create_on_open);
        assert!(!config.drop_on_open);

        let store = StoreConfig::default();
        assert_eq!(store.busy_timeout(), Duration::from_secs(5));

        let worker = WorkerConfig::default();
        assert_eq!(worker.workers, 1);
        assert_eq!(worker.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = QueueConfig::from_json_str(r#"{ "default_lease_secs": 30 }"#).unwrap();
        assert_eq!(config.default_lease_secs, 30);
        assert!(config.create_on_open);

        let store = StoreConfig::from_json_str(r#"{ "wal": false }"#).unwrap();
        assert!(!store.wal);
        assert_eq!(store.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
    }

    #[test]
    fn malformed_json_is_a_codec_error() {
        let err = QueueConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, QueueError::Codec(_)));
    }

    #[test]
    fn with_default_lease_truncates_to_seconds() {
        let config = QueueConfig::default().with_default_lease(Duration::from_millis(2_500));
        assert_eq!(config.default_lease_secs, 2);
    }
}
