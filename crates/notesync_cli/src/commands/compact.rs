//! Compact command implementation.

use super::open_store;
use std::path::Path;

/// Rewrites the journal as a snapshot of the current state.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let before = store.journal_size()?;

    println!("Compacting journal at {:?}", path);
    store.compact()?;
    let after = store.journal_size()?;

    println!("  Size before: {} bytes", before);
    println!("  Size after:  {} bytes", after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        before.saturating_sub(after),
        if before > 0 {
            (before.saturating_sub(after) as f64 / before as f64) * 100.0
        } else {
            0.0
        }
    );
    println!("✓ Compaction complete");
    Ok(())
}
