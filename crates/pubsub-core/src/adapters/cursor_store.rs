//! In-memory cursor store.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::{CursorKey, PubSubResult, Sequence};
use crate::ports::CursorStore;

/// Cursor store backed by a `HashMap`. Cursors live as long as the store.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<CursorKey, Sequence>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cursors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.read().is_empty()
    }
}

impl CursorStore for InMemoryCursorStore {
    fn load(&self, key: &CursorKey) -> PubSubResult<Option<Sequence>> {
        Ok(self.cursors.read().get(key).copied())
    }

    fn store(&self, key: &CursorKey, sequence: Sequence) -> PubSubResult<()> {
        self.cursors.write().insert(key.clone(), sequence);
        Ok(())
    }

    fn remove(&self, key: &CursorKey) -> PubSubResult<()> {
        self.cursors.write().remove(key);
        Ok(())
    }

    fn entries(&self) -> PubSubResult<Vec<(CursorKey, Sequence)>> {
        let mut entries: Vec<_> = self
            .cursors
            .read()
            .iter()
            .map(|(key, seq)| (key.clone(), *seq))
            .collect();
        entries.sort();
        Ok(entries)
    }
}
