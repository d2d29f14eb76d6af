//! Image command implementation.

use super::open_store;
use std::path::Path;

/// Reads an image file and attaches it to a session.
pub fn add(
    path: &Path,
    session_id: &str,
    file: &Path,
    content_type: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(file)?;
    let content_type = content_type.unwrap_or_else(|| guess_content_type(file));

    let store = open_store(path)?;
    let image = store.add_image(session_id, content_type, data)?;
    println!("{}", image.id);
    Ok(())
}

fn guess_content_type(file: &Path) -> &'static str {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}
