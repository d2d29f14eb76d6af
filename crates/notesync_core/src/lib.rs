//! # NoteSync Core
//!
//! The local side of NoteSync.
//!
//! This crate provides:
//! - [`LocalStore`]: keyed collections of sessions, notes and images,
//!   persisted as a JSON-lines journal with attachment bytes in a blob store
//! - [`PendingQueue`]: durable record of local mutations awaiting a push
//! - [`MetadataTracker`]: the singleton sync bookkeeping record
//! - [`ChangeFeed`]: observer interface fed by tracked local mutations
//!
//! User-facing mutations are *tracked*: they enqueue a pending change and
//! emit a change event. The sync engine writes through a separate set of
//! `*_from_remote` methods that do neither.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod config;
mod error;
mod journal;
mod metadata;
mod patch;
mod pending;
mod store;

pub use change_feed::{ChangeFeed, ChangeObserver, LocalChange};
pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use metadata::MetadataTracker;
pub use patch::{NotePatch, SessionPatch};
pub use pending::PendingQueue;
pub use store::LocalStore;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use notesync_protocol::{
    ChangeOperation, EntityType, Image, ImageMeta, Note, PendingChange, Session, SyncMetadata,
    Timestamp,
};
