//! # Pub/Sub Runtime Binary
//!
//! Runs the sample pipeline until Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, `PUBSUB_CONFIG`, `PUBSUB_*` env)
//! 2. Initialize logging
//! 3. Wire and start the pipeline
//! 4. Wait for Ctrl+C, then drain in-flight callbacks

use anyhow::{Context, Result};
use pubsub_runtime::{PubSubRuntime, RuntimeConfig};
use pubsub_telemetry::init_logging;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    init_logging(&config.telemetry).context("Failed to initialize logging")?;

    let runtime = PubSubRuntime::new(config).context("Failed to build runtime")?;
    runtime.start().context("Failed to start runtime")?;

    info!("Runtime is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
