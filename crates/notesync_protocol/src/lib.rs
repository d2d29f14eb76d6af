//! # NoteSync Protocol
//!
//! Entity model and wire types shared by the local store and the sync engine.
//!
//! This crate provides:
//! - The synchronized entities: [`Session`], [`Note`], [`ImageMeta`]
//! - Local bookkeeping records: [`SyncMetadata`], [`PendingChange`]
//! - The JSON delta envelope ([`SyncDelta`]) that doubles as the remote document
//! - Remote-document merge rules for pushes
//! - Conflict policies and conflict records
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod delta;
mod document;
mod error;
mod model;

pub use conflict::{Conflict, ConflictPolicy, Resolution};
pub use delta::{DeltaMetadata, EntityDelta, SyncDelta};
pub use document::RemoteDocument;
pub use error::{ProtocolError, ProtocolResult};
pub use model::{
    now_millis, ChangeOperation, EntityType, Image, ImageMeta, Note, PendingChange, Session,
    SyncMetadata, Syncable, Timestamp,
};
