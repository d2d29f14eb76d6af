//! Synchronized entities and local sync bookkeeping records.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Returns the current wall-clock time in milliseconds.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// Kind of synchronized entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A capture session.
    Session,
    /// A note inside a session.
    Note,
    /// An image attachment inside a session.
    Image,
}

impl EntityType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Session => "session",
            EntityType::Note => "note",
            EntityType::Image => "image",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(EntityType::Session),
            "note" => Ok(EntityType::Note),
            "image" => Ok(EntityType::Image),
            other => Err(ProtocolError::UnknownEntityType(other.to_string())),
        }
    }
}

/// A local mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    /// Entity was created.
    Create,
    /// Entity was updated.
    Update,
    /// Entity was deleted.
    Delete,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ChangeOperation::Create => "create",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        })
    }
}

/// Common view over the synchronized entities.
///
/// The delta generator, the applier and the remote merge only ever look at
/// entities through this trait.
pub trait Syncable: Clone {
    /// The entity type tag.
    const ENTITY_TYPE: EntityType;

    /// Entity id.
    fn id(&self) -> &str;

    /// Creation time.
    fn created_at(&self) -> Timestamp;

    /// Last modification time.
    fn last_modified(&self) -> Timestamp;

    /// Time the entity was last confirmed synced, if ever.
    fn sync_timestamp(&self) -> Option<Timestamp>;

    /// Records sync bookkeeping.
    fn mark_synced(&mut self, timestamp: Timestamp, version: u64);

    /// Returns true if the user-visible content of both versions is equal.
    fn same_content(&self, other: &Self) -> bool;

    /// An entity is unsynced iff its sync timestamp is absent or 0.
    fn is_unsynced(&self) -> bool {
        matches!(self.sync_timestamp(), None | Some(0))
    }

    /// Returns true if the entity was modified after creation.
    fn is_edited(&self) -> bool {
        self.created_at() != self.last_modified()
    }

    /// The timestamp used for last-write-wins comparisons.
    fn modified_at(&self) -> Timestamp {
        self.last_modified().max(self.created_at())
    }
}

/// A capture session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique, immutable id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub last_modified: Timestamp,
    /// Session score.
    #[serde(default)]
    pub score: i64,
    /// Sync version recorded at the last sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_version: Option<u64>,
    /// Time of the last confirmed sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_timestamp: Option<Timestamp>,
}

impl Syncable for Session {
    const ENTITY_TYPE: EntityType = EntityType::Session;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    fn sync_timestamp(&self) -> Option<Timestamp> {
        self.sync_timestamp
    }

    fn mark_synced(&mut self, timestamp: Timestamp, version: u64) {
        self.sync_timestamp = Some(timestamp);
        self.sync_version = Some(version);
    }

    fn same_content(&self, other: &Self) -> bool {
        self.title == other.title && self.score == other.score
    }
}

/// A note belonging to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique id.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Opaque text/markup content.
    pub content: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub last_modified: Timestamp,
    /// Time of the last confirmed sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_timestamp: Option<Timestamp>,
}

impl Syncable for Note {
    const ENTITY_TYPE: EntityType = EntityType::Note;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    fn sync_timestamp(&self) -> Option<Timestamp> {
        self.sync_timestamp
    }

    fn mark_synced(&mut self, timestamp: Timestamp, _version: u64) {
        self.sync_timestamp = Some(timestamp);
    }

    fn same_content(&self, other: &Self) -> bool {
        self.session_id == other.session_id && self.content == other.content
    }
}

/// Image attachment metadata.
///
/// This is what travels in deltas; the bytes never do. Images are
/// immutable after creation, so `last_modified` is `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMeta {
    /// Unique id.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// MIME type of the payload.
    pub content_type: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Remote blob reference, once uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_ref: Option<String>,
    /// Time of the last confirmed sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_timestamp: Option<Timestamp>,
}

impl Syncable for ImageMeta {
    const ENTITY_TYPE: EntityType = EntityType::Image;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn last_modified(&self) -> Timestamp {
        self.created_at
    }

    fn sync_timestamp(&self) -> Option<Timestamp> {
        self.sync_timestamp
    }

    fn mark_synced(&mut self, timestamp: Timestamp, _version: u64) {
        self.sync_timestamp = Some(timestamp);
    }

    fn same_content(&self, other: &Self) -> bool {
        self.session_id == other.session_id
            && self.content_type == other.content_type
            && self.blob_ref == other.blob_ref
    }
}

/// An image with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Metadata.
    pub meta: ImageMeta,
    /// Binary payload.
    pub data: Vec<u8>,
}

/// Singleton sync bookkeeping record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Cut timestamp of the last successful cycle (0 = never synced).
    #[serde(default)]
    pub last_sync_timestamp: Timestamp,
    /// Time of the most recent tracked local mutation.
    #[serde(default)]
    pub last_local_change_timestamp: Timestamp,
    /// Stamp of the remote document observed at the last successful cycle.
    #[serde(default)]
    pub last_cloud_timestamp: Timestamp,
    /// Monotonic sync version counter.
    #[serde(default)]
    pub sync_version: u64,
}

/// A durable record of a local mutation awaiting remote confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Unique id of the queue entry.
    pub id: String,
    /// Type of the mutated entity.
    pub entity_type: EntityType,
    /// Id of the mutated entity.
    pub entity_id: String,
    /// Mutation kind.
    pub operation: ChangeOperation,
    /// Enqueue time.
    pub timestamp: Timestamp,
    /// Entity snapshot for create/update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Number of failed push attempts that covered this entry.
    #[serde(default)]
    pub retry_count: u32,
}
