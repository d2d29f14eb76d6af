//! Remote document merge rules.
//!
//! The remote side is a single opaque JSON document per principal with the
//! same shape as [`SyncDelta`]. It does no merging on its own; a pushing
//! client reads it, folds its delta in with [`SyncDelta::merge_push`] and
//! writes it back.
//!
//! # Invariants
//!
//! - Each id appears at most once per entity type across created/updated
//! - An entity replaces the stored copy only if its modification time is not
//!   older than the stored one
//! - Tombstones are final: a push of a tombstoned id is ignored

use crate::delta::{EntityDelta, SyncDelta};
use crate::model::{Syncable, Timestamp};

/// The remote document. Same envelope as a delta.
pub type RemoteDocument = SyncDelta;

impl SyncDelta {
    /// Folds a pushed delta into this document.
    ///
    /// `stamp` becomes the document's `updatedAt`.
    pub fn merge_push(&mut self, pushed: &SyncDelta, stamp: Timestamp) {
        merge_entities(&mut self.sessions, &pushed.sessions);
        merge_entities(&mut self.notes, &pushed.notes);
        merge_entities(&mut self.images, &pushed.images);

        self.metadata.last_local_change_timestamp = self
            .metadata
            .last_local_change_timestamp
            .max(pushed.metadata.last_local_change_timestamp);
        self.metadata.sync_version = self.metadata.sync_version.max(pushed.metadata.sync_version);
        self.metadata.updated_at = Some(stamp);
    }

    /// Returns the document's write stamp, or 0 if it was never stamped.
    pub fn stamp(&self) -> Timestamp {
        self.metadata.updated_at.unwrap_or(0)
    }
}

enum Slot {
    Created(usize),
    Updated(usize),
}

fn merge_entities<T: Syncable>(doc: &mut EntityDelta<T>, pushed: &EntityDelta<T>) {
    for id in &pushed.deleted {
        doc.remove_changed(id);
        doc.push_deleted(id.clone());
    }

    for incoming in pushed.changed() {
        if doc.deleted.iter().any(|d| d == incoming.id()) {
            continue;
        }

        let slot = doc
            .created
            .iter()
            .position(|e| e.id() == incoming.id())
            .map(Slot::Created)
            .or_else(|| {
                doc.updated
                    .iter()
                    .position(|e| e.id() == incoming.id())
                    .map(Slot::Updated)
            });

        match slot {
            None if incoming.is_edited() => doc.updated.push(incoming.clone()),
            None => doc.created.push(incoming.clone()),
            Some(Slot::Created(i)) => {
                if incoming.modified_at() < doc.created[i].modified_at() {
                    continue;
                }
                if incoming.is_edited() {
                    doc.created.remove(i);
                    doc.updated.push(incoming.clone());
                } else {
                    doc.created[i] = incoming.clone();
                }
            }
            Some(Slot::Updated(i)) => {
                if incoming.modified_at() >= doc.updated[i].modified_at() {
                    doc.updated[i] = incoming.clone();
                }
            }
        }
    }
}
