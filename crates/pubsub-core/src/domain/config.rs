//! Broker and topic configuration.
//!
//! All values have defaults; `validate()` rejects values the core cannot
//! operate with (zero partitions, zero capacity, zero attempts).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::{PubSubError, PubSubResult};
use super::retry::RetryPolicy;
use crate::{DEFAULT_PARTITIONS, DEFAULT_QUEUE_CAPACITY};

/// What `enqueue` does when a partition queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Wait until a slot is released.
    #[default]
    Block,
    /// Fail immediately with `QueueFull`.
    Reject,
}

/// Per-topic settings fixed at declaration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub partitions: u32,
    /// Capacity of each partition queue.
    pub capacity: usize,
    pub backpressure: BackpressurePolicy,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
            capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: BackpressurePolicy::Block,
        }
    }
}

impl TopicConfig {
    pub fn with_partitions(partitions: u32) -> Self {
        Self {
            partitions,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.backpressure = policy;
        self
    }

    pub fn validate(&self) -> PubSubResult<()> {
        if self.partitions == 0 {
            return Err(PubSubError::InvalidConfig(
                "topic must have at least one partition".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(PubSubError::InvalidConfig(
                "queue capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Broker-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Settings for topics created on first publish.
    pub default_topic: TopicConfig,
    /// Create unknown topics on publish instead of failing with `TopicNotFound`.
    pub auto_create_topics: bool,
    /// Late acks within this many sequences of the cursor are accepted as duplicates.
    pub ack_tolerance: u64,
    /// How long `stop_dispatcher` waits for in-flight callbacks.
    #[serde(with = "duration_serde")]
    pub shutdown_grace: Duration,
    /// Policy used by subscribers that do not bring their own.
    pub retry: RetryPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_topic: TopicConfig::default(),
            auto_create_topics: true,
            ack_tolerance: 0,
            shutdown_grace: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> PubSubResult<()> {
        self.default_topic.validate()?;
        self.retry.validate()
    }
}

/// Duration (de)serialization as `"250ms"`, `"5s"`, `"2m"` or plain seconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}

pub use duration_serde::parse_duration;
