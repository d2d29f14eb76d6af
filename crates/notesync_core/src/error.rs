//! Error types for the local store.

use notesync_protocol::EntityType;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] notesync_storage::StorageError),

    /// Protocol value could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(#[from] notesync_protocol::ProtocolError),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Referenced session does not exist.
    #[error("session not found: {id}")]
    SessionNotFound {
        /// The session id.
        id: String,
    },

    /// Entity not found.
    #[error("{entity_type} not found: {id}")]
    EntityNotFound {
        /// Type of the missing entity.
        entity_type: EntityType,
        /// The entity id.
        id: String,
    },

    /// The journal is corrupted.
    #[error("journal corruption: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },
}

impl CoreError {
    /// Creates a session not found error.
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }

    /// Creates an entity not found error.
    pub fn entity_not_found(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}
