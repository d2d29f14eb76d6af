//! A remote store backed by a local directory.
//!
//! Layout:
//!
//! ```text
//! <root>/<principal>/document.json
//! <root>/<principal>/blobs/<blob-ref>
//! ```
//!
//! Useful for syncing two stores on one machine, or through a directory
//! replicated by some other tool. Writes go to a temp file first and are
//! renamed into place.

use crate::error::{SyncError, SyncResult};
use crate::remote::{AccessToken, BlobTransport, RemoteStore};
use async_trait::async_trait;
use notesync_storage::{validate_key, BlobStore, DirBlobStore, StorageError};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DOCUMENT_FILE: &str = "document.json";

/// Directory-backed [`RemoteStore`] and [`BlobTransport`].
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    /// Creates a remote rooted at `root`. Nothing is created until the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn principal_dir(&self, principal: &str) -> SyncResult<PathBuf> {
        validate_key(principal).map_err(|e| SyncError::transport_fatal(e.to_string()))?;
        Ok(self.root.join(principal))
    }

    fn blobs(&self, principal: &str) -> SyncResult<DirBlobStore> {
        let dir = self.principal_dir(principal)?.join("blobs");
        DirBlobStore::open(&dir).map_err(storage_error)
    }
}

/// The directory remote has no identity service; it only rejects an empty
/// credential.
fn check_token(token: &AccessToken) -> SyncResult<()> {
    if token.secret().is_empty() {
        return Err(SyncError::AuthenticationFailed("empty token".into()));
    }
    Ok(())
}

fn io_error(e: io::Error) -> SyncError {
    SyncError::transport_retryable(format!("directory remote: {e}"))
}

fn storage_error(e: StorageError) -> SyncError {
    match e {
        StorageError::Io(e) => io_error(e),
        other => SyncError::transport_fatal(format!("directory remote: {other}")),
    }
}

#[async_trait]
impl RemoteStore for DirectoryRemote {
    async fn fetch(&self, principal: &str, token: &AccessToken) -> SyncResult<Option<Vec<u8>>> {
        check_token(token)?;
        let path = self.principal_dir(principal)?.join(DOCUMENT_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn store(
        &self,
        principal: &str,
        token: &AccessToken,
        document: Vec<u8>,
    ) -> SyncResult<()> {
        check_token(token)?;
        let dir = self.principal_dir(principal)?;
        tokio::fs::create_dir_all(&dir).await.map_err(io_error)?;

        let temp = dir.join(format!(".{DOCUMENT_FILE}.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&temp, &document).await.map_err(io_error)?;
        tokio::fs::rename(&temp, dir.join(DOCUMENT_FILE))
            .await
            .map_err(io_error)?;

        tracing::debug!(principal, bytes = document.len(), "remote document written");
        Ok(())
    }
}

#[async_trait]
impl BlobTransport for DirectoryRemote {
    async fn upload(
        &self,
        principal: &str,
        token: &AccessToken,
        entity_id: &str,
        data: Vec<u8>,
        content_type: &str,
        parent_id: &str,
    ) -> SyncResult<String> {
        check_token(token)?;
        let blobs = self.blobs(principal)?;
        let blob_ref = Uuid::new_v4().to_string();
        blobs.put(&blob_ref, &data).map_err(storage_error)?;

        tracing::debug!(
            entity_id,
            parent_id,
            content_type,
            blob_ref = %blob_ref,
            "blob uploaded"
        );
        Ok(blob_ref)
    }

    async fn download(
        &self,
        principal: &str,
        token: &AccessToken,
        blob_ref: &str,
        _content_type: &str,
    ) -> SyncResult<Vec<u8>> {
        check_token(token)?;
        self.blobs(principal)?
            .get(blob_ref)
            .map_err(storage_error)?
            .ok_or_else(|| SyncError::transport_fatal(format!("unknown blob {blob_ref}")))
    }
}
