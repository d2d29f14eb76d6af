//! The delta envelope.
//!
//! The same JSON shape is used for the local delta pushed by a client, the
//! remote delta pulled by a client, and the remote document itself:
//!
//! ```json
//! {
//!   "sessions": { "created": [], "updated": [], "deleted": [] },
//!   "notes":    { "created": [], "updated": [], "deleted": [] },
//!   "images":   { "created": [], "updated": [], "deleted": [] },
//!   "metadata": { "lastLocalChangeTimestamp": 0, "syncVersion": 0 }
//! }
//! ```

use crate::error::ProtocolResult;
use crate::model::{EntityType, ImageMeta, Note, Session, Syncable, Timestamp};
use serde::{Deserialize, Serialize};

/// Created/updated/deleted partition for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct EntityDelta<T> {
    /// Entities new since the reference point.
    #[serde(default)]
    pub created: Vec<T>,
    /// Entities edited since the reference point.
    #[serde(default)]
    pub updated: Vec<T>,
    /// Ids of deleted entities (tombstones).
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl<T> Default for EntityDelta<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<T: Syncable> EntityDelta<T> {
    /// Returns true if all three partitions are empty.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Iterates over `created ∪ updated`.
    pub fn changed(&self) -> impl Iterator<Item = &T> {
        self.created.iter().chain(self.updated.iter())
    }

    /// Returns true if `id` appears in any partition.
    pub fn covers(&self, id: &str) -> bool {
        self.changed().any(|e| e.id() == id) || self.deleted.iter().any(|d| d == id)
    }

    /// Finds a created or updated entry by id.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut T> {
        self.created
            .iter_mut()
            .chain(self.updated.iter_mut())
            .find(|e| e.id() == id)
    }

    /// Drops created/updated entries with the given id.
    pub fn remove_changed(&mut self, id: &str) {
        self.created.retain(|e| e.id() != id);
        self.updated.retain(|e| e.id() != id);
    }

    /// Records a tombstone once.
    pub fn push_deleted(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.deleted.contains(&id) {
            self.deleted.push(id);
        }
    }
}

/// Envelope metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaMetadata {
    /// Latest local mutation time of the producing device.
    #[serde(default)]
    pub last_local_change_timestamp: Timestamp,
    /// Sync version carried by the envelope.
    #[serde(default)]
    pub sync_version: u64,
    /// Time the remote document was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl DeltaMetadata {
    /// Deterministic sync stamp for entities taken from this envelope.
    ///
    /// Always non-zero, so stamped entities count as synced.
    pub fn sync_stamp(&self) -> Timestamp {
        self.updated_at
            .unwrap_or(self.last_local_change_timestamp)
            .max(1)
    }
}

/// A full delta envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDelta {
    /// Session changes.
    #[serde(default)]
    pub sessions: EntityDelta<Session>,
    /// Note changes.
    #[serde(default)]
    pub notes: EntityDelta<Note>,
    /// Image metadata changes.
    #[serde(default)]
    pub images: EntityDelta<ImageMeta>,
    /// Envelope metadata.
    #[serde(default)]
    pub metadata: DeltaMetadata,
}

impl SyncDelta {
    /// Creates an empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an envelope from JSON bytes. Missing sections default to empty.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encodes the envelope as JSON bytes.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Returns true if no entity is created, updated or deleted.
    ///
    /// Metadata is ignored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.notes.is_empty() && self.images.is_empty()
    }

    /// Total number of entries across all entity types.
    pub fn change_count(&self) -> usize {
        self.sessions.len() + self.notes.len() + self.images.len()
    }

    /// Returns true if the entity appears anywhere in the envelope.
    pub fn covers(&self, entity_type: EntityType, id: &str) -> bool {
        match entity_type {
            EntityType::Session => self.sessions.covers(id),
            EntityType::Note => self.notes.covers(id),
            EntityType::Image => self.images.covers(id),
        }
    }

    /// Records a tombstone for the given entity.
    pub fn push_deleted(&mut self, entity_type: EntityType, id: impl Into<String>) {
        match entity_type {
            EntityType::Session => self.sessions.push_deleted(id),
            EntityType::Note => self.notes.push_deleted(id),
            EntityType::Image => self.images.push_deleted(id),
        }
    }

    /// Drops the created/updated entries of the given entity.
    pub fn remove_changed(&mut self, entity_type: EntityType, id: &str) {
        match entity_type {
            EntityType::Session => self.sessions.remove_changed(id),
            EntityType::Note => self.notes.remove_changed(id),
            EntityType::Image => self.images.remove_changed(id),
        }
    }

    /// Views the envelope as a full snapshot: every live entity in
    /// `created`, nothing in `updated`. Tombstones are kept.
    pub fn snapshot(&self) -> Self {
        fn flatten<T: Syncable>(delta: &EntityDelta<T>) -> EntityDelta<T> {
            EntityDelta {
                created: delta.changed().cloned().collect(),
                updated: Vec::new(),
                deleted: delta.deleted.clone(),
            }
        }

        Self {
            sessions: flatten(&self.sessions),
            notes: flatten(&self.notes),
            images: flatten(&self.images),
            metadata: self.metadata,
        }
    }
}
