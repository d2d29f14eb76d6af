//! Pending command implementation.

use super::open_store;
use std::path::Path;

/// Prints the pending change queue, oldest first.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let changes = store.pending().list_all();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }

    if changes.is_empty() {
        println!("Pending queue is empty");
        return Ok(());
    }

    println!("Pending changes: {}", changes.len());
    println!();
    for change in &changes {
        println!(
            "  {:>15}  {:<7} {:<7} {}  retries={}",
            change.timestamp,
            change.operation,
            change.entity_type,
            change.entity_id,
            change.retry_count
        );
    }
    Ok(())
}
