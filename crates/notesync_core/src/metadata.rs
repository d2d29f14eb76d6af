//! The singleton sync metadata record.

use crate::error::CoreResult;
use crate::journal::StoreRecord;
use crate::store::LocalStore;
use notesync_protocol::{SyncMetadata, Timestamp};

/// View over the store's [`SyncMetadata`].
///
/// `lastLocalChangeTimestamp` only ever moves forward.
pub struct MetadataTracker<'a> {
    store: &'a LocalStore,
}

impl<'a> MetadataTracker<'a> {
    pub(crate) fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Returns the current metadata.
    pub fn get(&self) -> SyncMetadata {
        self.store.read_state().metadata
    }

    /// Records a local mutation time.
    pub fn record_local_change(&self, timestamp: Timestamp) -> CoreResult<()> {
        self.store.write(|state| {
            if timestamp <= state.metadata.last_local_change_timestamp {
                return Ok((Vec::new(), ()));
            }
            let mut metadata = state.metadata;
            metadata.last_local_change_timestamp = timestamp;
            Ok((vec![StoreRecord::SetMetadata { metadata }], ()))
        })
    }

    /// Records the outcome of a successful sync cycle.
    pub fn record_sync(
        &self,
        last_sync: Timestamp,
        cloud_timestamp: Timestamp,
        sync_version: u64,
    ) -> CoreResult<SyncMetadata> {
        self.store.write(|state| {
            let metadata = SyncMetadata {
                last_sync_timestamp: last_sync,
                last_cloud_timestamp: cloud_timestamp,
                sync_version,
                ..state.metadata
            };
            Ok((vec![StoreRecord::SetMetadata { metadata }], metadata))
        })
    }

    /// Resets the metadata so the next cycle is a full sync.
    pub fn reset(&self) -> CoreResult<()> {
        self.store.write(|_| {
            Ok((
                vec![StoreRecord::SetMetadata {
                    metadata: SyncMetadata::default(),
                }],
                (),
            ))
        })
    }
}
