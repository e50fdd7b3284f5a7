//! # Pub/Sub Telemetry
//!
//! Logging bootstrap shared by the runtime binary and the test suite.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pubsub_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&TelemetryConfig::from_env())?;
//!     // Events from pubsub-core now reach stdout
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PUBSUB_LOG_LEVEL` / `RUST_LOG` | `info` | Filter directive |
//! | `PUBSUB_JSON_LOGS` | `false` | JSON output (defaults on inside containers) |
//! | `PUBSUB_LOG_SOURCE` | `false` | Include file and line |
//! | `PUBSUB_SERVICE_NAME` | `pubsub` | Service name in the startup event |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging, init_test_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Span for one subscription's handler on a topic.
///
/// ```rust,ignore
/// let _span = subscriber_span!("uppercase-processor", "input").entered();
/// ```
#[macro_export]
macro_rules! subscriber_span {
    ($subscriber:expr, $topic:expr) => {
        tracing::info_span!("subscriber", subscriber = %$subscriber, topic = %$topic)
    };
}
