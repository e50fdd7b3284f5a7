//! Example subscriber that logs each event it receives.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pubsub_core::{DeliveryMetadata, HandlerError, MessageHandler, SubscriberId};
use pubsub_telemetry::subscriber_span;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::event::PubSubEvent;

/// Recent events kept for inspection.
const HISTORY: usize = 64;

/// Logs every event and keeps a short history.
pub struct LoggingSubscriber {
    subscriber: SubscriberId,
    received: AtomicU64,
    recent: Mutex<VecDeque<PubSubEvent>>,
}

impl LoggingSubscriber {
    pub fn new(subscriber: SubscriberId) -> Self {
        Self {
            subscriber,
            received: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::with_capacity(HISTORY)),
        }
    }

    pub fn subscriber(&self) -> &SubscriberId {
        &self.subscriber
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }

    /// Most recent events, oldest first.
    pub fn recent(&self) -> Vec<PubSubEvent> {
        self.recent.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl MessageHandler for LoggingSubscriber {
    async fn handle(&self, payload: Bytes, metadata: DeliveryMetadata) -> Result<(), HandlerError> {
        let event =
            PubSubEvent::decode(&payload).map_err(|e| HandlerError::failed(e.to_string()))?;

        let _span = subscriber_span!(self.subscriber, metadata.topic()).entered();
        info!(
            event_type = %event.event_type,
            payload = %event.payload,
            partition = metadata.partition(),
            sequence = metadata.sequence(),
            "Received"
        );

        {
            let mut recent = self.recent.lock();
            if recent.len() == HISTORY {
                recent.pop_front();
            }
            recent.push_back(event);
        }
        self.received.fetch_add(1, Ordering::Release);
        Ok(())
    }
}
