//! # Processor Binding
//!
//! Subscribes to an input topic, transforms each event and publishes the
//! result to an output topic under the same key.
//!
//! ```text
//! input ──→ decode ──→ transform ──→ encode ──→ output
//!   (key K)                                     (key K)
//! ```
//!
//! The transform builds a new event; messages are never mutated in place.
//! Decode and publish failures are handler failures, so they follow the
//! subscription's retry policy and end in the dead-letter sink.

use async_trait::async_trait;
use bytes::Bytes;
use pubsub_core::{
    DeliveryMetadata, HandlerError, MessageHandler, PubSubBroker, PubSubResult, RetryPolicy,
    SubscriberId, SubscriptionHandle,
};
use pubsub_telemetry::subscriber_span;
use std::sync::Arc;
use tracing::{info, Instrument};

use crate::event::PubSubEvent;
use crate::publisher::EventPublisher;

/// Event transformation applied by a processor.
pub type Transform = Arc<dyn Fn(PubSubEvent) -> PubSubEvent + Send + Sync>;

/// Handler that republishes transformed events.
pub struct Processor {
    subscriber: SubscriberId,
    transform: Transform,
    output: EventPublisher,
}

impl Processor {
    pub fn new(subscriber: SubscriberId, transform: Transform, output: EventPublisher) -> Self {
        Self {
            subscriber,
            transform,
            output,
        }
    }

    /// Subscribe a processor to `input` that publishes to `output`.
    pub fn bind(
        broker: &PubSubBroker,
        input: &str,
        output: &str,
        subscriber: SubscriberId,
        transform: Transform,
        policy: RetryPolicy,
    ) -> PubSubResult<SubscriptionHandle> {
        let publisher = EventPublisher::new(broker.clone(), output);
        let processor = Arc::new(Self::new(subscriber.clone(), transform, publisher));
        let handle = broker.subscribe(input, subscriber, processor, policy)?;
        info!(input, output, subscriber = %handle.subscriber, "Processor bound");
        Ok(handle)
    }

    async fn process(&self, payload: Bytes, metadata: DeliveryMetadata) -> Result<(), HandlerError> {
        let event = PubSubEvent::decode(&payload).map_err(|e| HandlerError::failed(e.to_string()))?;
        info!(
            key = metadata.key().unwrap_or("-"),
            payload = %event.payload,
            attempt = metadata.attempt(),
            "received"
        );

        let transformed = (self.transform)(event);
        self.output
            .publish_keyed(metadata.key(), &transformed)
            .await
            .map_err(|e| HandlerError::failed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for Processor {
    async fn handle(&self, payload: Bytes, metadata: DeliveryMetadata) -> Result<(), HandlerError> {
        let span = subscriber_span!(self.subscriber, metadata.topic());
        self.process(payload, metadata).instrument(span).await
    }
}
