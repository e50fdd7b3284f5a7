//! Outbound (Driven) ports for the dispatch core.
//!
//! These traits define the external collaborators the core calls into:
//! subscriber callbacks, the dead-letter sink, cursor persistence and the
//! clock.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{
    CursorKey, DeadLetter, DeliveryMetadata, HandlerError, PubSubResult, Sequence, Timestamp,
};

/// Subscriber callback.
///
/// Delivery is at-least-once, so implementations must tolerate seeing the
/// same message more than once (`metadata.is_redelivery()` hints at it).
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message.
    ///
    /// # Returns
    ///
    /// - `Ok(())` - the message is acknowledged and the cursor advances
    /// - `Err(_)` - the attempt failed and the retry policy applies
    async fn handle(&self, payload: Bytes, metadata: DeliveryMetadata) -> Result<(), HandlerError>;
}

/// Terminal destination for messages that exhausted their retries.
///
/// Invoked exactly once per (message, subscriber) that is dead-lettered.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(&self, letter: DeadLetter);
}

/// Cursor persistence.
///
/// Kept apart from the queues so a restarted dispatcher can look up where
/// each lane stopped without touching queued messages.
pub trait CursorStore: Send + Sync {
    fn load(&self, key: &CursorKey) -> PubSubResult<Option<Sequence>>;

    fn store(&self, key: &CursorKey, sequence: Sequence) -> PubSubResult<()>;

    fn remove(&self, key: &CursorKey) -> PubSubResult<()>;

    /// All stored cursors, for inspection.
    fn entries(&self) -> PubSubResult<Vec<(CursorKey, Sequence)>>;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Mock time source for testing.
#[cfg(test)]
pub struct MockTimeSource {
    time: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl MockTimeSource {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            time: std::sync::atomic::AtomicU64::new(initial),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.time.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.time.load(std::sync::atomic::Ordering::SeqCst)
    }
}
