//! Configuration types for bangumi-dispatch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Batching behaviour of the download queue
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue length that must be exceeded before a cycle drains (default: 10)
    ///
    /// A drain cycle waits until the queue holds *more* than this many items, so that
    /// the download client receives fewer, larger submissions.
    #[serde(default = "default_min_batch_threshold")]
    pub min_batch_threshold: usize,

    /// Maximum number of torrents drained and submitted per cycle (default: 5)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long a cycle waits for the threshold before draining whatever is queued
    /// (default: 10 seconds, `None` = wait indefinitely)
    #[serde(
        default = "default_threshold_timeout",
        with = "optional_duration_serde"
    )]
    pub threshold_timeout: Option<Duration>,

    /// Maximum number of queued torrents (None = unbounded)
    #[serde(default)]
    pub capacity: Option<usize>,

    /// What to do when `capacity` is reached
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Which drained torrents are written to the store after a cycle
    #[serde(default)]
    pub persist: PersistPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_batch_threshold: default_min_batch_threshold(),
            batch_size: default_batch_size(),
            threshold_timeout: default_threshold_timeout(),
            capacity: None,
            overflow: OverflowPolicy::default(),
            persist: PersistPolicy::default(),
        }
    }
}

/// Behaviour of a capped queue when a producer enqueues past capacity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the new torrent with [`Error::QueueFull`] (default)
    #[default]
    Reject,
    /// Evict the oldest queued torrent to make room
    DropOldest,
}

/// Which torrents of a drained batch are persisted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// Only torrents the download client accepted (default)
    #[default]
    SubmittedOnly,
    /// Every drained torrent, whether or not its submission succeeded
    AllDrained,
}

/// Retry configuration for transient dispatch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Hand failed submissions to the background retry worker (default: true)
    ///
    /// When disabled, failed torrents are recorded as dead letters straight away.
    #[serde(default = "default_true")]
    pub retry_failed: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            retry_failed: true,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./bangumi-dispatch.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for [`DownloadPipeline`](crate::DownloadPipeline)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Queue batching and overflow settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Retry and dead-letter settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check settings that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.queue.batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".to_string(),
                key: Some("batch_size".to_string()),
            });
        }
        if self.queue.capacity == Some(0) {
            return Err(Error::Config {
                message: "capacity must be at least 1 when set".to_string(),
                key: Some("capacity".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff_multiplier must be >= 1.0, got {}",
                    self.retry.backoff_multiplier
                ),
                key: Some("backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }
}

fn default_min_batch_threshold() -> usize {
    10
}

fn default_batch_size() -> usize {
    5
}

fn default_threshold_timeout() -> Option<Duration> {
    Some(Duration::from_secs(10))
}

fn default_database_path() -> PathBuf {
    PathBuf::from("bangumi-dispatch.db")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
