//! Session and note commands.

use super::open_store;
use std::path::Path;

/// Creates a session and prints its id.
pub fn add_session(path: &Path, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let session = store.create_session(title)?;
    println!("{}", session.id);
    Ok(())
}

/// Lists sessions, oldest first.
pub fn list_sessions(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let sessions = store.list_sessions();

    if sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    for session in sessions {
        let notes = store.list_notes(&session.id).len();
        let images = store.list_images(&session.id).len();
        println!(
            "{}  {:<24} score={:<4} notes={:<3} images={:<3} {}",
            session.id,
            session.title,
            session.score,
            notes,
            images,
            sync_marker(session.sync_timestamp.is_some())
        );
    }
    Ok(())
}

/// Adds a note to a session and prints its id.
pub fn add_note(
    path: &Path,
    session_id: &str,
    content: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let note = store.create_note(session_id, content)?;
    println!("{}", note.id);
    Ok(())
}

/// Lists the notes of a session, oldest first.
pub fn list_notes(path: &Path, session_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    if store.get_session(session_id).is_none() {
        return Err(format!("No session {session_id}").into());
    }

    for note in store.list_notes(session_id) {
        println!(
            "{}  {}  {}",
            note.id,
            sync_marker(note.sync_timestamp.is_some()),
            note.content
        );
    }
    Ok(())
}

fn sync_marker(synced: bool) -> &'static str {
    if synced {
        "synced"
    } else {
        "local"
    }
}
