//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The credential was missing or rejected.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A remote call did not finish in time.
    #[error("operation timed out")]
    Timeout,

    /// Another cycle is already running on this engine.
    #[error("sync cycle already in progress")]
    CycleInProgress,

    /// Local store error during sync.
    #[error("store error: {0}")]
    Store(#[from] notesync_core::CoreError),

    /// Protocol value could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] notesync_protocol::ProtocolError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }

    /// Returns true if the caller should re-authenticate.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SyncError::AuthenticationFailed(_))
    }
}
