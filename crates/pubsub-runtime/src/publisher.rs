//! Publisher helper bound to one topic.

use pubsub_core::{MessageHandle, PubSubBroker, PubSubError};
use thiserror::Error;
use tracing::debug;

use crate::event::{CodecError, PubSubEvent};

/// Publish failures.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Broker(#[from] PubSubError),
}

/// Encodes `PubSubEvent`s and publishes them to a fixed topic.
#[derive(Clone)]
pub struct EventPublisher {
    broker: PubSubBroker,
    topic: String,
}

impl EventPublisher {
    pub fn new(broker: PubSubBroker, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish without a key (round-robin partition).
    pub async fn publish(&self, event: &PubSubEvent) -> Result<MessageHandle, PublishError> {
        self.publish_keyed(None, event).await
    }

    /// Publish with `key`; events sharing a key are delivered in order.
    pub async fn publish_keyed(
        &self,
        key: Option<&str>,
        event: &PubSubEvent,
    ) -> Result<MessageHandle, PublishError> {
        let message = event.to_outbound(&self.topic, key)?;
        let handle = self.broker.publish_message(message).await?;
        debug!(
            topic = %self.topic,
            event_type = %event.event_type,
            partition = handle.partition,
            sequence = handle.sequence,
            "Event published"
        );
        Ok(handle)
    }
}
