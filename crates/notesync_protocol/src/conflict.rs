//! Conflict detection and resolution.

use crate::error::ProtocolError;
use crate::model::{EntityType, Syncable, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of comparing a local entity with its remote version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    /// Keep the local content.
    KeepLocal,
    /// Overwrite local content with the remote version.
    AcceptRemote,
}

/// Policy for automatic conflict resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Greater modification time wins; ties favor local.
    #[default]
    LastWriteWins,
    /// Local always wins.
    LocalWins,
    /// Remote always wins.
    RemoteWins,
}

impl ConflictPolicy {
    /// Returns the policy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::LastWriteWins => "last-write-wins",
            ConflictPolicy::LocalWins => "local-wins",
            ConflictPolicy::RemoteWins => "remote-wins",
        }
    }

    /// Decides which version survives given both modification times.
    pub fn resolve(&self, local_modified: Timestamp, remote_modified: Timestamp) -> Resolution {
        match self {
            ConflictPolicy::LastWriteWins if remote_modified > local_modified => {
                Resolution::AcceptRemote
            }
            ConflictPolicy::LastWriteWins | ConflictPolicy::LocalWins => Resolution::KeepLocal,
            ConflictPolicy::RemoteWins => Resolution::AcceptRemote,
        }
    }

    /// Compares a local entity with its remote version.
    ///
    /// Returns the resolution and, when the two versions genuinely diverge,
    /// a conflict record. A conflict exists when local is strictly newer, or
    /// when both carry the same modification time but different content.
    pub fn evaluate<T: Syncable>(&self, local: &T, remote: &T) -> (Resolution, Option<Conflict>) {
        let local_modified = local.modified_at();
        let remote_modified = remote.modified_at();
        let resolution = self.resolve(local_modified, remote_modified);

        let diverged = local_modified > remote_modified
            || (local_modified == remote_modified && !local.same_content(remote));

        let conflict = diverged.then(|| Conflict {
            entity_type: T::ENTITY_TYPE,
            entity_id: local.id().to_string(),
            local_modified,
            remote_modified,
            resolution,
        });

        (resolution, conflict)
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-write-wins" => Ok(ConflictPolicy::LastWriteWins),
            "local-wins" => Ok(ConflictPolicy::LocalWins),
            "remote-wins" => Ok(ConflictPolicy::RemoteWins),
            other => Err(ProtocolError::UnknownPolicy(other.to_string())),
        }
    }
}

/// A recorded conflict between a local entity and its remote version.
///
/// Conflicts are not errors: they are resolved deterministically and only
/// recorded for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Entity type.
    pub entity_type: EntityType,
    /// Entity id.
    pub entity_id: String,
    /// Local `max(lastModified, createdAt)`.
    pub local_modified: Timestamp,
    /// Remote `max(lastModified, createdAt)`.
    pub remote_modified: Timestamp,
    /// Applied resolution.
    pub resolution: Resolution,
}

impl Conflict {
    /// Returns the conflict identifier `"<type>:<id>"`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.entity_type, self.entity_id)
    }
}
