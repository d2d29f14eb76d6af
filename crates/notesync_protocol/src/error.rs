//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or parsing protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown conflict policy name.
    #[error("unknown conflict policy: {0}")]
    UnknownPolicy(String),

    /// Unknown entity type name.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),
}
