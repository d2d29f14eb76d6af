//! Journal backend trait definition.

use crate::error::StorageResult;

/// A byte store holding the local store's journal.
///
/// Backends are **opaque**: the local store owns record framing and
/// decoding, backends only move bytes.
///
/// # Invariants
///
/// - `append` never rewrites existing bytes
/// - `read_all` returns every byte appended since the last `replace`
/// - `replace` is atomic: after a crash either the old or the new content is
///   visible, never a mix
/// - Backends must be `Send + Sync` so the store can be shared across tasks
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads the entire content of the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Atomically replaces the entire content with `data`.
    ///
    /// Used for journal compaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the new content cannot be written.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Flushes pending writes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// After this returns successfully, all previously appended data
    /// survives process termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}
