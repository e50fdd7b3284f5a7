//! # Runtime Configuration
//!
//! Unified configuration for the broker, logging and the sample pipeline.
//!
//! ## Load Order
//!
//! 1. Defaults
//! 2. JSON file named by `PUBSUB_CONFIG` (optional, partial files allowed)
//! 3. `PUBSUB_*` environment overrides
//! 4. Validation

use pubsub_core::domain::parse_duration;
use pubsub_core::{BackpressurePolicy, BrokerConfig, PubSubError};
use pubsub_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "PUBSUB_CONFIG";

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Dispatch core settings.
    pub broker: BrokerConfig,
    /// Logging settings.
    pub telemetry: TelemetryConfig,
    /// Topic and subscriber bindings.
    pub pipeline: PipelineConfig,
}

/// Topic bindings for the processor and example subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Topic the processor consumes.
    pub input_topic: String,
    /// Topic the processor publishes transformed events to.
    pub output_topic: String,
    /// Subscriber id of the processor on the input topic.
    pub processor_group: String,
    /// Subscriber id of the logging subscriber on the output topic.
    pub subscriber_group: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_topic: "input".to_string(),
            output_topic: "output".to_string(),
            processor_group: "pubsub-processor".to_string(),
            subscriber_group: "example-subscriber".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidEnv {
        var: String,
        value: String,
        reason: String,
    },

    #[error("Invalid pipeline: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Broker(#[from] PubSubError),
}

impl RuntimeConfig {
    /// Load from defaults, `PUBSUB_CONFIG` and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.telemetry = config.telemetry.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply `PUBSUB_*` overrides read through `lookup`.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `PUBSUB_PARTITIONS` | `broker.default_topic.partitions` |
    /// | `PUBSUB_QUEUE_CAPACITY` | `broker.default_topic.capacity` |
    /// | `PUBSUB_BACKPRESSURE` | `broker.default_topic.backpressure` (`block`/`reject`) |
    /// | `PUBSUB_AUTO_CREATE_TOPICS` | `broker.auto_create_topics` |
    /// | `PUBSUB_ACK_TOLERANCE` | `broker.ack_tolerance` |
    /// | `PUBSUB_SHUTDOWN_GRACE` | `broker.shutdown_grace` |
    /// | `PUBSUB_MAX_ATTEMPTS` | `broker.retry.max_attempts` |
    /// | `PUBSUB_INITIAL_BACKOFF` | `broker.retry.initial_backoff` |
    /// | `PUBSUB_MAX_BACKOFF` | `broker.retry.max_backoff` |
    /// | `PUBSUB_CALLBACK_TIMEOUT` | `broker.retry.callback_timeout` |
    /// | `PUBSUB_INPUT_TOPIC` | `pipeline.input_topic` |
    /// | `PUBSUB_OUTPUT_TOPIC` | `pipeline.output_topic` |
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let broker = &mut self.broker;
        if let Some(v) = lookup("PUBSUB_PARTITIONS") {
            broker.default_topic.partitions = parse_number("PUBSUB_PARTITIONS", &v)?;
        }
        if let Some(v) = lookup("PUBSUB_QUEUE_CAPACITY") {
            broker.default_topic.capacity = parse_number("PUBSUB_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("PUBSUB_BACKPRESSURE") {
            broker.default_topic.backpressure = match v.to_lowercase().as_str() {
                "block" => BackpressurePolicy::Block,
                "reject" => BackpressurePolicy::Reject,
                _ => return Err(invalid("PUBSUB_BACKPRESSURE", &v, "expected block or reject")),
            };
        }
        if let Some(v) = lookup("PUBSUB_AUTO_CREATE_TOPICS") {
            broker.auto_create_topics = match v.to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(invalid("PUBSUB_AUTO_CREATE_TOPICS", &v, "expected a boolean")),
            };
        }
        if let Some(v) = lookup("PUBSUB_ACK_TOLERANCE") {
            broker.ack_tolerance = parse_number("PUBSUB_ACK_TOLERANCE", &v)?;
        }
        if let Some(v) = lookup("PUBSUB_SHUTDOWN_GRACE") {
            broker.shutdown_grace = parse_duration_var("PUBSUB_SHUTDOWN_GRACE", &v)?;
        }
        if let Some(v) = lookup("PUBSUB_MAX_ATTEMPTS") {
            broker.retry.max_attempts = parse_number("PUBSUB_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("PUBSUB_INITIAL_BACKOFF") {
            broker.retry.initial_backoff = parse_duration_var("PUBSUB_INITIAL_BACKOFF", &v)?;
        }
        if let Some(v) = lookup("PUBSUB_MAX_BACKOFF") {
            broker.retry.max_backoff = parse_duration_var("PUBSUB_MAX_BACKOFF", &v)?;
        }
        if let Some(v) = lookup("PUBSUB_CALLBACK_TIMEOUT") {
            broker.retry.callback_timeout = parse_duration_var("PUBSUB_CALLBACK_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("PUBSUB_INPUT_TOPIC") {
            self.pipeline.input_topic = v;
        }
        if let Some(v) = lookup("PUBSUB_OUTPUT_TOPIC") {
            self.pipeline.output_topic = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.validate()?;
        let pipeline = &self.pipeline;
        if pipeline.input_topic.is_empty() || pipeline.output_topic.is_empty() {
            return Err(ConfigError::Pipeline("topic names must not be empty".into()));
        }
        if pipeline.input_topic == pipeline.output_topic {
            return Err(ConfigError::Pipeline(format!(
                "processor would consume its own output on topic {}",
                pipeline.input_topic
            )));
        }
        if pipeline.processor_group.is_empty() || pipeline.subscriber_group.is_empty() {
            return Err(ConfigError::Pipeline(
                "subscriber ids must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn invalid(var: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_number<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| invalid(var, value, e.to_string()))
}

fn parse_duration_var(var: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value.trim()).map_err(|reason| invalid(var, value, reason))
}
