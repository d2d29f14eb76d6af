//! # NoteSync Sync Engine
//!
//! Offline-first bidirectional synchronization between a [`LocalStore`]
//! and one opaque JSON document per principal on a remote store.
//!
//! This crate provides:
//! - Delta generation from the local store
//! - Remote delta application with conflict resolution
//! - Attachment upload and restore with bounded concurrency
//! - The single-flight sync orchestrator and its trigger run loop
//! - Remote adapters: in-memory (for tests) and directory-backed
//!
//! ## Architecture
//!
//! One sync cycle is **pull-merge-push-cleanup**:
//! 1. Fetch the remote document and apply it locally
//! 2. Restore attachment bytes that are known remotely but missing locally
//! 3. Generate the local delta and upload missing attachments
//! 4. Fold the delta into the remote document (read-modify-write)
//! 5. Drop the pending changes the push covered and record sync metadata
//!
//! ## Key Invariants
//!
//! - At most one cycle runs at a time per engine
//! - A failed cycle never touches the sync metadata
//! - Applying the same remote document twice is a no-op
//! - Conflicts are resolved deterministically; ties keep the local copy
//!
//! [`LocalStore`]: notesync_core::LocalStore

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod delta;
mod error;
mod fs_remote;
mod relay;
mod remote;
mod state;
mod trigger;

pub use applier::{ApplyCounters, ApplyOutcome, DeltaApplier};
pub use config::{RetryConfig, SyncConfig};
pub use delta::DeltaGenerator;
pub use error::{SyncError, SyncResult};
pub use fs_remote::DirectoryRemote;
pub use relay::{BlobRelay, RelayFailure, RelayReport};
pub use remote::{
    AccessToken, BlobTransport, CredentialProvider, MemoryRemote, RemoteFailure, RemoteStore,
    StaticCredentials,
};
pub use state::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use trigger::{SyncTrigger, TriggerBus, TriggerReceiver};
