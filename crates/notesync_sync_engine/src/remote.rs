//! Remote collaborators: document store, attachment transport, credentials.
//!
//! The remote side is deliberately dumb. It stores one opaque JSON document
//! per principal and opaque attachment blobs; all merging happens in the
//! client.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use notesync_protocol::SyncDelta;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// A bearer credential handed out by a [`CredentialProvider`].
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Supplies access tokens. Acquisition and refresh happen elsewhere.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns a valid token or [`SyncError::AuthenticationFailed`].
    async fn access_token(&self) -> SyncResult<AccessToken>;
}

/// A credential provider with a fixed token.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: Option<AccessToken>,
}

impl StaticCredentials {
    /// Always hands out `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(AccessToken::new(token)),
        }
    }

    /// A provider without a credential; every request fails authentication.
    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn access_token(&self) -> SyncResult<AccessToken> {
        self.token
            .clone()
            .ok_or_else(|| SyncError::AuthenticationFailed("no credential available".into()))
    }
}

/// Reads and writes the per-principal remote document.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches the document bytes, or `None` if none was ever stored.
    async fn fetch(&self, principal: &str, token: &AccessToken) -> SyncResult<Option<Vec<u8>>>;

    /// Replaces the document.
    async fn store(&self, principal: &str, token: &AccessToken, document: Vec<u8>)
        -> SyncResult<()>;
}

/// Uploads and downloads attachment bytes.
#[async_trait]
pub trait BlobTransport: Send + Sync {
    /// Uploads bytes and returns the blob reference.
    async fn upload(
        &self,
        principal: &str,
        token: &AccessToken,
        entity_id: &str,
        data: Vec<u8>,
        content_type: &str,
        parent_id: &str,
    ) -> SyncResult<String>;

    /// Downloads the bytes behind a blob reference.
    async fn download(
        &self,
        principal: &str,
        token: &AccessToken,
        blob_ref: &str,
        content_type: &str,
    ) -> SyncResult<Vec<u8>>;
}

/// Runs a remote call under a deadline. Expiry is [`SyncError::Timeout`].
pub(crate) async fn timed<T>(
    timeout: Duration,
    call: impl Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout),
    }
}

/// Failure modes a [`MemoryRemote`] can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFailure {
    /// Retryable transport error.
    Transport,
    /// Credential rejected.
    Auth,
    /// Never answers (trips the engine timeout).
    Hang,
}

impl RemoteFailure {
    async fn trigger<T>(self, operation: &str) -> SyncResult<T> {
        match self {
            RemoteFailure::Transport => Err(SyncError::transport_retryable(format!(
                "injected {operation} failure"
            ))),
            RemoteFailure::Auth => Err(SyncError::AuthenticationFailed(format!(
                "injected {operation} rejection"
            ))),
            RemoteFailure::Hang => {
                std::future::pending::<()>().await;
                Err(SyncError::Timeout)
            }
        }
    }
}

/// An in-process remote for tests and demos.
///
/// Implements both [`RemoteStore`] and [`BlobTransport`]. Devices that share
/// one `MemoryRemote` (behind an `Arc`) see each other's pushes.
#[derive(Default)]
pub struct MemoryRemote {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    accepted_token: RwLock<Option<String>>,
    fetch_failure: Mutex<Option<RemoteFailure>>,
    store_failure: Mutex<Option<RemoteFailure>>,
    failing_uploads: Mutex<HashSet<String>>,
    failing_downloads: Mutex<HashSet<String>>,
    transfer_delay: Mutex<Duration>,
    fetches: AtomicUsize,
    stores: AtomicUsize,
    uploads: AtomicUsize,
    downloads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryRemote {
    /// Creates an empty remote that accepts any token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept this token from now on.
    pub fn accept_only(&self, token: impl Into<String>) {
        *self.accepted_token.write() = Some(token.into());
    }

    /// Makes every fetch fail (or succeed again with `None`).
    pub fn set_fetch_failure(&self, failure: Option<RemoteFailure>) {
        *self.fetch_failure.lock() = failure;
    }

    /// Makes every store fail (or succeed again with `None`).
    pub fn set_store_failure(&self, failure: Option<RemoteFailure>) {
        *self.store_failure.lock() = failure;
    }

    /// Makes uploads for this entity id fail.
    pub fn fail_upload_for(&self, entity_id: impl Into<String>) {
        self.failing_uploads.lock().insert(entity_id.into());
    }

    /// Makes downloads of this blob reference fail.
    pub fn fail_download_for(&self, blob_ref: impl Into<String>) {
        self.failing_downloads.lock().insert(blob_ref.into());
    }

    /// Clears all injected failures.
    pub fn heal(&self) {
        self.set_fetch_failure(None);
        self.set_store_failure(None);
        self.failing_uploads.lock().clear();
        self.failing_downloads.lock().clear();
    }

    /// Delays every blob transfer.
    pub fn set_transfer_delay(&self, delay: Duration) {
        *self.transfer_delay.lock() = delay;
    }

    /// Stores raw document bytes, bypassing the merge.
    pub fn put_document(&self, principal: &str, bytes: Vec<u8>) {
        self.documents.write().insert(principal.to_string(), bytes);
    }

    /// Decodes the stored document, if any.
    pub fn document(&self, principal: &str) -> Option<SyncDelta> {
        let bytes = self.documents.read().get(principal).cloned()?;
        SyncDelta::from_json(&bytes).ok()
    }

    /// Stores blob bytes under a reference.
    pub fn put_blob(&self, blob_ref: impl Into<String>, data: Vec<u8>) {
        self.blobs.write().insert(blob_ref.into(), data);
    }

    /// Returns the bytes stored under a reference.
    pub fn blob(&self, blob_ref: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(blob_ref).cloned()
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.blobs.read().len()
    }

    /// Number of fetch calls.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of successful document writes.
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    /// Number of upload calls.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Number of download calls.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Highest number of blob transfers observed in flight at once.
    pub fn max_transfers_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check_token(&self, token: &AccessToken) -> SyncResult<()> {
        match self.accepted_token.read().as_deref() {
            Some(accepted) if accepted != token.secret() => {
                Err(SyncError::AuthenticationFailed("token rejected".into()))
            }
            _ => Ok(()),
        }
    }

    async fn transfer<T>(&self, work: impl FnOnce() -> SyncResult<T>) -> SyncResult<T> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.transfer_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = work();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(&self, principal: &str, token: &AccessToken) -> SyncResult<Option<Vec<u8>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_token(token)?;
        let failure = *self.fetch_failure.lock();
        if let Some(failure) = failure {
            return failure.trigger("fetch").await;
        }
        Ok(self.documents.read().get(principal).cloned())
    }

    async fn store(
        &self,
        principal: &str,
        token: &AccessToken,
        document: Vec<u8>,
    ) -> SyncResult<()> {
        self.check_token(token)?;
        let failure = *self.store_failure.lock();
        if let Some(failure) = failure {
            return failure.trigger("store").await;
        }
        self.documents
            .write()
            .insert(principal.to_string(), document);
        self.stores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BlobTransport for MemoryRemote {
    async fn upload(
        &self,
        _principal: &str,
        token: &AccessToken,
        entity_id: &str,
        data: Vec<u8>,
        _content_type: &str,
        _parent_id: &str,
    ) -> SyncResult<String> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.check_token(token)?;
        let fails = self.failing_uploads.lock().contains(entity_id);
        self.transfer(|| {
            if fails {
                return Err(SyncError::transport_retryable(format!(
                    "injected upload failure for {entity_id}"
                )));
            }
            let blob_ref = Uuid::new_v4().to_string();
            self.blobs.write().insert(blob_ref.clone(), data);
            Ok(blob_ref)
        })
        .await
    }

    async fn download(
        &self,
        _principal: &str,
        token: &AccessToken,
        blob_ref: &str,
        _content_type: &str,
    ) -> SyncResult<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.check_token(token)?;
        let fails = self.failing_downloads.lock().contains(blob_ref);
        self.transfer(|| {
            if fails {
                return Err(SyncError::transport_retryable(format!(
                    "injected download failure for {blob_ref}"
                )));
            }
            self.blobs
                .read()
                .get(blob_ref)
                .cloned()
                .ok_or_else(|| SyncError::transport_fatal(format!("unknown blob {blob_ref}")))
        })
        .await
    }
}
