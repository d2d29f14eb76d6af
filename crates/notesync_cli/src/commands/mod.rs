//! CLI command implementations.

pub mod compact;
pub mod entities;
pub mod image;
pub mod pending;
pub mod status;
pub mod sync;

use notesync_core::{LocalStore, StoreConfig};
use std::path::Path;

/// Opens (or creates) the store in `path`.
pub fn open_store(path: &Path) -> Result<LocalStore, Box<dyn std::error::Error>> {
    Ok(LocalStore::open(path, StoreConfig::default())?)
}
