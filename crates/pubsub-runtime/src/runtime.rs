//! # Pipeline Runtime
//!
//! Explicit wiring of the sample pipeline:
//!
//! ```text
//! EventPublisher ──→ [input] ──→ Processor(uppercase) ──→ [output] ──→ LoggingSubscriber
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Build the broker from `RuntimeConfig::broker`
//! 2. Declare input and output topics with the default topic config
//! 3. Bind the processor and the logging subscriber
//! 4. Start the dispatcher

use parking_lot::Mutex;
use pubsub_core::{PubSubBroker, PubSubError, SubscriberId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::{ConfigError, RuntimeConfig};
use crate::event::uppercase_payload;
use crate::processor::{Processor, Transform};
use crate::publisher::EventPublisher;
use crate::subscriber::LoggingSubscriber;

/// Runtime construction and startup failures.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Broker(#[from] PubSubError),
}

/// Owns the broker and the sample pipeline bindings.
pub struct PubSubRuntime {
    config: RuntimeConfig,
    broker: PubSubBroker,
    transform: Transform,
    subscriber: Arc<LoggingSubscriber>,
    started: Mutex<bool>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
}

impl PubSubRuntime {
    /// Build a runtime with the uppercase transform.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::with_transform(config, Arc::new(uppercase_payload))
    }

    pub fn with_transform(config: RuntimeConfig, transform: Transform) -> Result<Self, RuntimeError> {
        config.validate()?;
        let broker = PubSubBroker::new(config.broker.clone())?;
        let subscriber = Arc::new(LoggingSubscriber::new(SubscriberId::new(
            config.pipeline.subscriber_group.as_str(),
        )));
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            broker,
            transform,
            subscriber,
            started: Mutex::new(false),
            shutdown_tx,
        })
    }

    /// Declare topics, bind the pipeline and start dispatching.
    ///
    /// Bindings are made once; later calls only restart the dispatcher.
    pub fn start(&self) -> Result<(), RuntimeError> {
        let pipeline = &self.config.pipeline;
        let mut started = self.started.lock();
        if !*started {
            let defaults = self.config.broker.default_topic.clone();
            self.broker
                .declare_topic_with(&pipeline.input_topic, defaults.clone())?;
            self.broker
                .declare_topic_with(&pipeline.output_topic, defaults)?;

            Processor::bind(
                &self.broker,
                &pipeline.input_topic,
                &pipeline.output_topic,
                SubscriberId::new(pipeline.processor_group.as_str()),
                Arc::clone(&self.transform),
                self.config.broker.retry.clone(),
            )?;
            self.broker.subscribe_default(
                &pipeline.output_topic,
                self.subscriber.subscriber().clone(),
                self.subscriber.clone(),
            )?;
            *started = true;
        }

        self.broker.start_dispatcher();
        self.shutdown_tx.send_replace(false);
        info!(
            service = %self.config.telemetry.service_name,
            input = %pipeline.input_topic,
            output = %pipeline.output_topic,
            "Pub/sub runtime started"
        );
        Ok(())
    }

    /// Stop the dispatcher and notify shutdown watchers.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.broker.stop_dispatcher().await;

        self.shutdown_tx.send_replace(true);

        let stats = self.broker.stats();
        match serde_json::to_string(&stats) {
            Ok(json) => info!(stats = %json, "Shutdown complete"),
            Err(e) => error!("Failed to serialize stats: {}", e),
        }
    }

    /// Publisher for the pipeline's input topic.
    pub fn input_publisher(&self) -> EventPublisher {
        EventPublisher::new(self.broker.clone(), self.config.pipeline.input_topic.as_str())
    }

    pub fn broker(&self) -> &PubSubBroker {
        &self.broker
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn subscriber(&self) -> &Arc<LoggingSubscriber> {
        &self.subscriber
    }

    /// Receiver that flips to `true` once `shutdown` completes.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}
