//! # Offset/Ack Tracker
//!
//! Owns the read-modify-write of subscription cursors. The cursor store
//! itself is only a map; every update goes through `AckTracker` so the
//! check against the current cursor and the write are one step.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{
    evaluate_ack, AckOutcome, CursorKey, PubSubError, PubSubResult, Sequence,
};
use crate::ports::CursorStore;

/// Serialises cursor updates over a `CursorStore`.
pub struct AckTracker {
    store: Arc<dyn CursorStore>,
    tolerance: u64,
    write_lock: Mutex<()>,
}

impl AckTracker {
    pub fn new(store: Arc<dyn CursorStore>, tolerance: u64) -> Self {
        Self {
            store,
            tolerance,
            write_lock: Mutex::new(()),
        }
    }

    pub fn tolerance(&self) -> u64 {
        self.tolerance
    }

    /// Last acknowledged sequence for `key` (0 if none).
    pub fn current_cursor(&self, key: &CursorKey) -> PubSubResult<Sequence> {
        Ok(self.store.load(key)?.unwrap_or(0))
    }

    /// Every stored cursor.
    pub fn entries(&self) -> PubSubResult<Vec<(CursorKey, Sequence)>> {
        self.store.entries()
    }

    /// Record that `sequence` is done for `key`.
    ///
    /// # Errors
    ///
    /// - `PubSubError::OutOfOrder` - `sequence + tolerance <= cursor`
    pub fn record_ack(&self, key: &CursorKey, sequence: Sequence) -> PubSubResult<AckOutcome> {
        let _guard = self.write_lock.lock();
        self.apply_ack(key, sequence)
    }

    /// Like `record_ack`, but skipped when `skip` returns true. `skip` runs
    /// under the same lock as `discard`, so a cancelled subscription can
    /// never write a cursor after it was discarded.
    pub(crate) fn record_ack_unless(
        &self,
        key: &CursorKey,
        sequence: Sequence,
        skip: impl FnOnce() -> bool,
    ) -> PubSubResult<Option<AckOutcome>> {
        let _guard = self.write_lock.lock();
        if skip() {
            return Ok(None);
        }
        self.apply_ack(key, sequence).map(Some)
    }

    fn apply_ack(&self, key: &CursorKey, sequence: Sequence) -> PubSubResult<AckOutcome> {
        let cursor = self.store.load(key)?.unwrap_or(0);
        let outcome =
            evaluate_ack(cursor, sequence, self.tolerance).map_err(|stale| {
                PubSubError::OutOfOrder {
                    topic: key.topic.clone(),
                    subscriber: key.subscriber.clone(),
                    partition: key.partition,
                    sequence,
                    cursor: stale.cursor,
                }
            })?;
        if let AckOutcome::Advanced { to, .. } = outcome {
            self.store.store(key, to)?;
        }
        Ok(outcome)
    }

    /// Operator reset. May move the cursor backwards. Returns the previous value.
    pub fn reset_cursor(&self, key: &CursorKey, sequence: Sequence) -> PubSubResult<Sequence> {
        let _guard = self.write_lock.lock();
        let previous = self.store.load(key)?.unwrap_or(0);
        self.store.store(key, sequence)?;
        info!(cursor = %key, previous, sequence, "Cursor reset");
        Ok(previous)
    }

    /// Return the stored cursor, or store and return `default` when absent.
    pub(crate) fn initialize(&self, key: &CursorKey, default: Sequence) -> PubSubResult<Sequence> {
        let _guard = self.write_lock.lock();
        match self.store.load(key)? {
            Some(existing) => Ok(existing),
            None => {
                self.store.store(key, default)?;
                Ok(default)
            }
        }
    }

    /// Run `before` then remove `keys`, all under the write lock.
    pub(crate) fn discard(&self, keys: &[CursorKey], before: impl FnOnce()) -> PubSubResult<()> {
        let _guard = self.write_lock.lock();
        before();
        for key in keys {
            self.store.remove(key)?;
        }
        debug!(cursors = keys.len(), "Cursors discarded");
        Ok(())
    }
}
