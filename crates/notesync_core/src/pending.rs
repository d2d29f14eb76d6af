//! The pending change queue.
//!
//! Entries are appended by the store's tracked mutations and removed by
//! the sync orchestrator once a push covering them succeeded. The queue is
//! a view over the store: every write is journaled.

use crate::error::CoreResult;
use crate::journal::StoreRecord;
use crate::store::LocalStore;
use notesync_protocol::{ChangeOperation, EntityType, PendingChange};

/// View over the store's pending change queue.
pub struct PendingQueue<'a> {
    store: &'a LocalStore,
}

impl<'a> PendingQueue<'a> {
    pub(crate) fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Appends a new entry with a fresh id, the current time and a retry
    /// count of 0. Also moves `lastLocalChangeTimestamp` forward.
    pub fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation: ChangeOperation,
        payload: Option<serde_json::Value>,
    ) -> CoreResult<PendingChange> {
        let now = self.store.tick();
        let change = LocalStore::new_pending(entity_type, entity_id, operation, payload, now);
        self.store.write(|_| {
            Ok((
                vec![StoreRecord::EnqueuePending {
                    change: change.clone(),
                }],
                (),
            ))
        })?;
        Ok(change)
    }

    /// Returns all entries ordered by timestamp; ties keep enqueue order.
    pub fn list_all(&self) -> Vec<PendingChange> {
        let mut entries = self.store.read_state().pending.clone();
        entries.sort_by_key(|p| p.timestamp);
        entries
    }

    /// Removes an entry. Removing an unknown id is not an error.
    pub fn remove(&self, id: &str) -> CoreResult<()> {
        self.store.write(|state| {
            let records = if state.pending.iter().any(|p| p.id == id) {
                vec![StoreRecord::RemovePending { id: id.to_string() }]
            } else {
                Vec::new()
            };
            Ok((records, ()))
        })
    }

    /// Increments the retry count of an entry.
    ///
    /// Returns the new count, or `None` if the entry is gone.
    pub fn increment_retry(&self, id: &str) -> CoreResult<Option<u32>> {
        self.store.write(|state| {
            let Some(entry) = state.pending.iter().find(|p| p.id == id) else {
                return Ok((Vec::new(), None));
            };
            let mut change = entry.clone();
            change.retry_count = change.retry_count.saturating_add(1);
            let count = change.retry_count;
            Ok((vec![StoreRecord::UpdatePending { change }], Some(count)))
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.store.read_state().pending.len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.store.read_state().pending.is_empty()
    }

    /// Highest retry count in the queue (0 when empty).
    pub fn max_retry_count(&self) -> u32 {
        self.store
            .read_state()
            .pending
            .iter()
            .map(|p| p.retry_count)
            .max()
            .unwrap_or(0)
    }
}
