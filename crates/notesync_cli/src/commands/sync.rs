//! Sync command implementation.

use super::open_store;
use notesync_sync_engine::{
    DirectoryRemote, StaticCredentials, SyncConfig, SyncCycleResult, SyncEngine,
};
use std::path::Path;
use std::sync::Arc;

/// Environment variable holding the remote credential.
pub const TOKEN_VAR: &str = "NOTESYNC_TOKEN";

/// Runs one sync cycle, retried per the default policy.
pub fn run(path: &Path, remote: &Path, principal: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(open_store(path)?);
    let token = std::env::var(TOKEN_VAR).unwrap_or_else(|_| "local".to_string());
    let remote = Arc::new(DirectoryRemote::new(remote));

    let engine = SyncEngine::new(
        SyncConfig::new(principal),
        store,
        Arc::clone(&remote),
        remote,
        Arc::new(StaticCredentials::new(token)),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(engine.sync_with_retry())?;

    print_result(&result);
    Ok(())
}

fn print_result(result: &SyncCycleResult) {
    println!("Sync complete in {:?}", result.duration);
    if result.forced_full_sync {
        println!("  (empty store, pulled the full remote document)");
    }
    println!(
        "  Pulled:    {} created, {} updated, {} deleted",
        result.remote_created, result.remote_updated, result.remote_deleted
    );
    println!(
        "  Applied:   {} inserted, {} overwritten, {} kept local, {} deleted",
        result.applied.inserted,
        result.applied.overwritten,
        result.applied.kept_local,
        result.applied.deleted
    );
    println!("  Pushed:    {}", result.pushed);
    println!(
        "  Images:    {} uploaded, {} restored",
        result.uploads.uploaded, result.restores.restored
    );
    println!("  Cleared:   {} pending changes", result.pending_removed);
    println!("  Version:   {}", result.sync_version);

    if !result.conflicts.is_empty() {
        println!();
        println!("Conflicts ({}):", result.conflicts.len());
        for id in result.conflict_ids() {
            println!("  {id}");
        }
    }

    let failures: Vec<_> = result
        .uploads
        .failed
        .iter()
        .chain(&result.restores.failed)
        .collect();
    if !failures.is_empty() {
        println!();
        println!("Image transfers failed ({}):", failures.len());
        for failure in failures {
            println!("  {}: {}", failure.image_id, failure.error);
        }
    }
}
