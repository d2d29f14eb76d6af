//! # NoteSync Storage
//!
//! Byte-level persistence for the NoteSync local store.
//!
//! Two kinds of storage live here, and neither interprets what it stores:
//!
//! - **Journal backends** ([`StorageBackend`]) hold the append-only record
//!   log of the local store. They support appending, reading everything back
//!   on open, and atomically replacing the whole content during compaction.
//! - **Blob stores** ([`BlobStore`]) hold attachment bytes keyed by image id.
//!
//! ## Available Implementations
//!
//! - [`InMemoryBackend`] / [`MemoryBlobStore`] - For testing and ephemeral stores
//! - [`FileBackend`] / [`DirBlobStore`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use notesync_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"{\"op\":\"noop\"}\n").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"{\"op\":\"noop\"}\n");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod blob;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use blob::{validate_key, BlobStore, DirBlobStore, MemoryBlobStore};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
