//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to every event
    pub service_name: String,

    /// Filter directive (`info`, `pubsub_core=debug,info`, ...)
    pub log_level: String,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Whether to include source file and line in each event
    pub with_source: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "pubsub".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_source: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PUBSUB_SERVICE_NAME`: Service name (default: pubsub)
    /// - `PUBSUB_LOG_LEVEL` or `RUST_LOG`: Filter directive (default: info)
    /// - `PUBSUB_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `PUBSUB_LOG_SOURCE`: Include file/line (default: false)
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        if let Ok(name) = env::var("PUBSUB_SERVICE_NAME") {
            self.service_name = name;
        }
        if let Ok(level) = env::var("PUBSUB_LOG_LEVEL").or_else(|_| env::var("RUST_LOG")) {
            self.log_level = level;
        }
        self.json_logs = env::var("PUBSUB_JSON_LOGS")
            .map(|v| parse_flag(&v))
            .unwrap_or(self.json_logs || is_container);
        if let Ok(v) = env::var("PUBSUB_LOG_SOURCE") {
            self.with_source = parse_flag(&v);
        }
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
