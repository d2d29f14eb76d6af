//! Status command implementation.

use super::open_store;
use notesync_core::{LocalStore, SyncMetadata};
use serde::Serialize;
use std::path::Path;

/// Store status report.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Store directory.
    pub path: String,
    /// Live sessions.
    pub sessions: usize,
    /// Live notes.
    pub notes: usize,
    /// Live images.
    pub images: usize,
    /// Images whose bytes have no remote reference yet.
    pub images_without_blob_ref: usize,
    /// Pending change queue length.
    pub pending: usize,
    /// Highest retry count in the queue.
    pub max_retry_count: u32,
    /// Journal size in bytes.
    pub journal_bytes: u64,
    /// Sync bookkeeping.
    pub metadata: SyncMetadata,
}

impl StatusReport {
    /// Collects the report from an open store.
    pub fn collect(path: &Path, store: &LocalStore) -> Result<Self, Box<dyn std::error::Error>> {
        let images = store.all_images();
        let pending = store.pending();
        Ok(Self {
            path: path.display().to_string(),
            sessions: store.session_count(),
            notes: store.all_notes().len(),
            images: images.len(),
            images_without_blob_ref: images.iter().filter(|i| i.blob_ref.is_none()).count(),
            pending: pending.len(),
            max_retry_count: pending.max_retry_count(),
            journal_bytes: store.journal_size()?,
            metadata: store.metadata().get(),
        })
    }
}

/// Prints sync metadata and entity counts.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let report = StatusReport::collect(path, &store)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("NoteSync Store: {}", report.path);
    println!();
    println!("Entities:");
    println!("  Sessions: {}", report.sessions);
    println!("  Notes:    {}", report.notes);
    println!(
        "  Images:   {} ({} not uploaded)",
        report.images, report.images_without_blob_ref
    );
    println!();
    println!("Sync:");
    if report.metadata.last_sync_timestamp == 0 {
        println!("  Last sync:         never");
    } else {
        println!("  Last sync:         {}", report.metadata.last_sync_timestamp);
    }
    println!(
        "  Last local change: {}",
        report.metadata.last_local_change_timestamp
    );
    println!("  Last cloud stamp:  {}", report.metadata.last_cloud_timestamp);
    println!("  Sync version:      {}", report.metadata.sync_version);
    println!(
        "  Pending changes:   {} (max retries {})",
        report.pending, report.max_retry_count
    );
    println!();
    println!("Journal: {} bytes", report.journal_bytes);
    Ok(())
}
