//! Attachment transfers.
//!
//! Image bytes never travel inside deltas. Before a push, the relay uploads
//! the bytes of every local image that has no remote blob reference yet and
//! patches the reference into the outgoing delta. After a pull, it downloads
//! the bytes of remote images that are missing locally.
//!
//! Transfers run concurrently, bounded by the configured limit. A failed
//! transfer is recorded and the rest carry on; the cycle itself does not
//! fail. A rejected credential is the exception: it fails the whole batch
//! so the cycle aborts and the caller can re-authenticate.

use crate::error::{SyncError, SyncResult};
use crate::remote::{timed, AccessToken, BlobTransport};
use futures::stream::{self, StreamExt};
use notesync_core::LocalStore;
use notesync_protocol::{ImageMeta, SyncDelta, Syncable, Timestamp};
use std::time::Duration;

/// A transfer that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
    /// Image id.
    pub image_id: String,
    /// Error description.
    pub error: String,
}

/// Summary of one batch of transfers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Images uploaded.
    pub uploaded: usize,
    /// Images downloaded and stored.
    pub restored: usize,
    /// Candidates without a remote reference to download from.
    pub skipped: usize,
    /// Failed transfers.
    pub failed: Vec<RelayFailure>,
}

impl RelayReport {
    /// Returns true if no transfer failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Transfer {
    Restored,
    Skipped,
    Failed(RelayFailure),
    Rejected(SyncError),
}

/// Moves image bytes between the local store and a [`BlobTransport`].
pub struct BlobRelay<'a, B: BlobTransport + ?Sized> {
    store: &'a LocalStore,
    transport: &'a B,
    token: &'a AccessToken,
    principal: &'a str,
    concurrency: usize,
    timeout: Duration,
}

impl<'a, B: BlobTransport + ?Sized> BlobRelay<'a, B> {
    /// Creates a relay with one transfer at a time and a 30 second deadline.
    pub fn new(
        store: &'a LocalStore,
        transport: &'a B,
        token: &'a AccessToken,
        principal: &'a str,
    ) -> Self {
        Self {
            store,
            transport,
            token,
            principal,
            concurrency: 1,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the number of transfers in flight (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the per-transfer deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Downloads the bytes of remote images and stores them locally.
    ///
    /// Restored images are stamped synced with `stamp`. Candidates without a
    /// blob reference are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AuthenticationFailed`] if the transport rejected
    /// the credential for any download.
    pub async fn restore(
        &self,
        candidates: Vec<ImageMeta>,
        stamp: Timestamp,
    ) -> SyncResult<RelayReport> {
        let results: Vec<Transfer> = stream::iter(candidates)
            .map(|meta| self.restore_one(meta, stamp))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = RelayReport::default();
        let mut rejected = None;
        for result in results {
            match result {
                Transfer::Restored => report.restored += 1,
                Transfer::Skipped => report.skipped += 1,
                Transfer::Failed(failure) => report.failed.push(failure),
                Transfer::Rejected(e) => rejected = Some(e),
            }
        }
        if let Some(e) = rejected {
            return Err(e);
        }

        if report.restored + report.failed.len() > 0 {
            tracing::info!(
                restored = report.restored,
                failed = report.failed.len(),
                "images restored"
            );
        }
        Ok(report)
    }

    async fn restore_one(&self, mut meta: ImageMeta, stamp: Timestamp) -> Transfer {
        let Some(blob_ref) = meta.blob_ref.clone() else {
            tracing::debug!(image_id = %meta.id, "image has no remote reference yet");
            return Transfer::Skipped;
        };

        let downloaded = timed(
            self.timeout,
            self.transport
                .download(self.principal, self.token, &blob_ref, &meta.content_type),
        )
        .await;

        let stored = downloaded.and_then(|data| {
            meta.mark_synced(stamp, 0);
            self.store
                .insert_image_from_remote(meta.clone(), &data)
                .map_err(Into::into)
        });

        match stored {
            Ok(()) => Transfer::Restored,
            Err(e) if e.is_auth_failure() => Transfer::Rejected(e),
            Err(e) => {
                tracing::warn!(image_id = %meta.id, blob_ref = %blob_ref, error = %e, "image restore failed");
                Transfer::Failed(RelayFailure {
                    image_id: meta.id,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Uploads local images that have no remote reference and patches the
    /// outgoing delta.
    ///
    /// On success the reference is persisted locally and written into the
    /// delta entry (the image is added to `images.updated` if the delta did
    /// not carry it). On failure the image is dropped from the delta so its
    /// metadata never reaches the remote without a reference; it stays
    /// unsynced and is retried next cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AuthenticationFailed`] if the transport rejected
    /// the credential. References of uploads that did succeed are still
    /// persisted locally.
    pub async fn upload(&self, delta: &mut SyncDelta) -> SyncResult<RelayReport> {
        let mut candidates = Vec::new();
        for meta in self.store.all_images() {
            if meta.blob_ref.is_some() {
                continue;
            }
            if let Some(image) = self.store.get_image(&meta.id)? {
                candidates.push(image);
            }
        }

        let results: Vec<(ImageMeta, SyncResult<String>)> = stream::iter(candidates)
            .map(|image| async move {
                let result = timed(
                    self.timeout,
                    self.transport.upload(
                        self.principal,
                        self.token,
                        &image.meta.id,
                        image.data,
                        &image.meta.content_type,
                        &image.meta.session_id,
                    ),
                )
                .await;
                (image.meta, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = RelayReport::default();
        let mut rejected = None;
        for (meta, result) in results {
            let patched = match result {
                Ok(blob_ref) => self
                    .store
                    .set_image_blob_ref(&meta.id, blob_ref)
                    .map_err(Into::into),
                Err(e) => Err(e),
            };

            match patched {
                Ok(updated) => {
                    match delta.images.find_mut(&updated.id) {
                        Some(entry) => entry.blob_ref = updated.blob_ref.clone(),
                        None => delta.images.updated.push(updated),
                    }
                    report.uploaded += 1;
                }
                Err(e) if e.is_auth_failure() => {
                    delta.images.remove_changed(&meta.id);
                    rejected = Some(e);
                }
                Err(e) => {
                    tracing::warn!(image_id = %meta.id, error = %e, "image upload failed");
                    delta.images.remove_changed(&meta.id);
                    report.failed.push(RelayFailure {
                        image_id: meta.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.uploaded + report.failed.len() > 0 {
            tracing::info!(
                uploaded = report.uploaded,
                failed = report.failed.len(),
                "images uploaded"
            );
        }
        match rejected {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
