//! Local delta generation.
//!
//! Classification of each entity relative to a reference timestamp `since`:
//!
//! | entity state                           | `since == 0` | `since > 0` |
//! |----------------------------------------|--------------|-------------|
//! | unsynced                               | created      | created     |
//! | synced, edited after `since`           | excluded     | updated     |
//! | synced, otherwise                      | excluded     | excluded    |
//!
//! "Edited" means `createdAt != lastModified`. Deletions never come from
//! here; the orchestrator adds tombstones from the pending change queue.

use notesync_core::LocalStore;
use notesync_protocol::{DeltaMetadata, EntityDelta, SyncDelta, Syncable, Timestamp};

/// Builds the local delta from the store.
pub struct DeltaGenerator<'a> {
    store: &'a LocalStore,
}

impl<'a> DeltaGenerator<'a> {
    /// Creates a generator over a store.
    pub fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Classifies every session, note and image relative to `since`.
    ///
    /// Image entries carry metadata only. The envelope metadata carries the
    /// store's `lastLocalChangeTimestamp` and `syncVersion + 1`.
    pub fn generate_delta(&self, since: Timestamp) -> SyncDelta {
        let metadata = self.store.metadata().get();

        let delta = SyncDelta {
            sessions: classify(self.store.list_sessions(), since),
            notes: classify(self.store.all_notes(), since),
            images: classify(self.store.all_images(), since),
            metadata: DeltaMetadata {
                last_local_change_timestamp: metadata.last_local_change_timestamp,
                sync_version: metadata.sync_version + 1,
                updated_at: None,
            },
        };

        tracing::debug!(
            since,
            sessions = delta.sessions.len(),
            notes = delta.notes.len(),
            images = delta.images.len(),
            "local delta generated"
        );
        delta
    }
}

/// Partitions entities into created/updated relative to `since`.
pub(crate) fn classify<T: Syncable>(entities: Vec<T>, since: Timestamp) -> EntityDelta<T> {
    let mut delta = EntityDelta::default();
    for entity in entities {
        if entity.is_unsynced() {
            delta.created.push(entity);
        } else if since > 0 && entity.last_modified() > since && entity.is_edited() {
            delta.updated.push(entity);
        }
    }
    delta
}
