//! Sync engine state machine.

use crate::applier::{ApplyCounters, DeltaApplier};
use crate::config::SyncConfig;
use crate::delta::DeltaGenerator;
use crate::error::{SyncError, SyncResult};
use crate::relay::{BlobRelay, RelayReport};
use crate::remote::{timed, AccessToken, BlobTransport, CredentialProvider, RemoteStore};
use crate::trigger::{Message, SyncTrigger, TriggerReceiver};
use notesync_core::LocalStore;
use notesync_protocol::{
    now_millis, ChangeOperation, Conflict, EntityType, PendingChange, Resolution, SyncDelta,
    Syncable, Timestamp,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle is running.
    Idle,
    /// A cycle is running.
    Syncing,
    /// The last cycle failed.
    Error,
}

impl SyncState {
    /// Returns true while a cycle runs.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Total number of sync cycles that failed.
    pub cycles_failed: u64,
    /// Local writes caused by remote changes.
    pub entities_pulled: u64,
    /// Entries pushed to the remote document.
    pub entities_pushed: u64,
    /// Total number of conflicts encountered.
    pub conflicts_encountered: u64,
    /// Images uploaded.
    pub blobs_uploaded: u64,
    /// Images restored from the remote.
    pub blobs_restored: u64,
    /// Failed image transfers.
    pub blob_failures: u64,
    /// Total number of retries.
    pub retries: u64,
    /// Wall-clock time of the last successful cycle.
    pub last_sync_time: Option<Timestamp>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Reference timestamp the remote document was viewed against.
    pub since: Timestamp,
    /// True if `since` was forced to 0 because the store was empty.
    pub forced_full_sync: bool,
    /// Entities in the `created` partitions of the remote view.
    pub remote_created: usize,
    /// Entities in the `updated` partitions of the remote view.
    pub remote_updated: usize,
    /// Tombstones in the remote view.
    pub remote_deleted: usize,
    /// What the applier wrote.
    pub applied: ApplyCounters,
    /// Conflicts detected and resolved.
    pub conflicts: Vec<Conflict>,
    /// Entries pushed to the remote document.
    pub pushed: usize,
    /// Pending changes dropped after the push.
    pub pending_removed: usize,
    /// Upload path report.
    pub uploads: RelayReport,
    /// Restore path report.
    pub restores: RelayReport,
    /// Sync version recorded by the cycle.
    pub sync_version: u64,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    /// Conflict identifiers, `"<type>:<id>"`.
    pub fn conflict_ids(&self) -> Vec<String> {
        self.conflicts.iter().map(Conflict::id).collect()
    }
}

/// Resets the single-flight flag when a cycle ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Wake {
    Message(Option<Message>),
    Deadline,
}

/// The sync engine keeps a [`LocalStore`] and one remote document in step.
///
/// # Example
///
/// ```rust
/// use notesync_core::LocalStore;
/// use notesync_sync_engine::{MemoryRemote, StaticCredentials, SyncConfig, SyncEngine};
/// use std::sync::Arc;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = Arc::new(LocalStore::open_in_memory().unwrap());
/// let remote = Arc::new(MemoryRemote::new());
/// let engine = SyncEngine::new(
///     SyncConfig::new("alice"),
///     store.clone(),
///     remote.clone(),
///     remote.clone(),
///     Arc::new(StaticCredentials::new("token")),
/// );
///
/// store.create_session("Morning").unwrap();
/// let result = engine.sync().await.unwrap();
/// assert_eq!(result.pushed, 1);
/// assert!(store.pending().is_empty());
/// # });
/// ```
pub struct SyncEngine<R: RemoteStore, B: BlobTransport> {
    config: SyncConfig,
    store: Arc<LocalStore>,
    remote: Arc<R>,
    blobs: Arc<B>,
    credentials: Arc<dyn CredentialProvider>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    in_flight: AtomicBool,
    /// Start and end of the most recent cycle.
    last_cycle: Mutex<Option<(Instant, Instant)>>,
}

impl<R: RemoteStore, B: BlobTransport> SyncEngine<R, B> {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        store: Arc<LocalStore>,
        remote: Arc<R>,
        blobs: Arc<B>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            config,
            store,
            remote,
            blobs,
            credentials,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            in_flight: AtomicBool::new(false),
            last_cycle: Mutex::new(None),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the local store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a cycle runs.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs one pull-merge-push-cleanup cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CycleInProgress`] if a cycle is already running.
    /// Any other error aborts the cycle before the sync metadata is written.
    pub async fn sync(&self) -> SyncResult<SyncCycleResult> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("sync requested while a cycle is running");
            return Err(SyncError::CycleInProgress);
        }
        let _guard = FlightGuard(&self.in_flight);

        let started = Instant::now();
        self.set_state(SyncState::Syncing);
        let pending_at_start: Vec<String> = self
            .store
            .pending()
            .list_all()
            .into_iter()
            .map(|p| p.id)
            .collect();

        let span = tracing::info_span!("sync_cycle", principal = %self.config.principal);
        let result = self.run_cycle(started).instrument(span).await;
        *self.last_cycle.lock() = Some((started, Instant::now()));

        match result {
            Ok(result) => {
                self.set_state(SyncState::Idle);
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.entities_pulled += (result.applied.inserted
                    + result.applied.overwritten
                    + result.applied.deleted
                    + result.restores.restored) as u64;
                stats.entities_pushed += result.pushed as u64;
                stats.conflicts_encountered += result.conflicts.len() as u64;
                stats.blobs_uploaded += result.uploads.uploaded as u64;
                stats.blobs_restored += result.restores.restored as u64;
                stats.blob_failures +=
                    (result.uploads.failed.len() + result.restores.failed.len()) as u64;
                stats.last_sync_time = Some(now_millis());
                stats.last_error = None;
                Ok(result)
            }
            Err(e) => {
                self.handle_error(&e, &pending_at_start);
                Err(e)
            }
        }
    }

    /// Runs [`sync`](Self::sync) again on retryable errors, with backoff.
    pub async fn sync_with_retry(&self) -> SyncResult<SyncCycleResult> {
        let retry_config = &self.config.retry;
        let mut failed = 0;
        loop {
            let error = match self.sync().await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };
            failed += 1;
            let delay = match retry_config.backoff(failed) {
                Some(delay) if error.is_retryable() => delay,
                _ => return Err(error),
            };
            tracing::debug!(failed, delay_ms = delay.as_millis() as u64, error = %error, "retrying sync");
            tokio::time::sleep(delay).await;
            self.stats.write().retries += 1;
        }
    }

    /// Records a failed cycle.
    ///
    /// Pending changes that the cycle would have pushed get their retry
    /// count bumped, except when the credential was rejected.
    fn handle_error(&self, error: &SyncError, pending: &[String]) {
        self.set_state(SyncState::Error);
        {
            let mut stats = self.stats.write();
            stats.cycles_failed += 1;
            stats.last_error = Some(error.to_string());
        }

        if error.is_auth_failure() {
            tracing::warn!(error = %error, "sync cycle rejected, re-authentication required");
            return;
        }
        tracing::warn!(error = %error, retryable = error.is_retryable(), "sync cycle failed");

        let queue = self.store.pending();
        for id in pending {
            if let Err(e) = queue.increment_retry(id) {
                tracing::warn!(pending_id = %id, error = %e, "failed to record retry");
            }
        }
    }

    async fn run_cycle(&self, started: Instant) -> SyncResult<SyncCycleResult> {
        let timeout = self.config.timeout;
        let principal = self.config.principal.as_str();

        // 1. Credential and reference point.
        let token = timed(timeout, self.credentials.access_token()).await?;
        let metadata = self.store.metadata().get();
        let last_sync = metadata.last_sync_timestamp;
        let empty_store = self.store.session_count() == 0;
        let since = if empty_store { 0 } else { last_sync };
        let forced_full_sync = empty_store && last_sync != 0;
        tracing::info!(since, forced_full_sync, "sync cycle started");

        // 2. Pull.
        let document = self.fetch_document(&token).await?;
        let mut remote_view = if since == 0 {
            document.snapshot()
        } else {
            document
        };
        withhold_local_deletes(&mut remote_view, &self.store.pending().list_all());
        let remote_created = remote_view.sessions.created.len()
            + remote_view.notes.created.len()
            + remote_view.images.created.len();
        let remote_updated = remote_view.sessions.updated.len()
            + remote_view.notes.updated.len()
            + remote_view.images.updated.len();
        let remote_deleted = remote_view.sessions.deleted.len()
            + remote_view.notes.deleted.len()
            + remote_view.images.deleted.len();

        // 3. Merge.
        let applied = DeltaApplier::new(&self.store, self.config.conflict_policy)
            .apply_remote_delta(&remote_view)?;

        // 4. Restore missing attachments.
        let relay = BlobRelay::new(&self.store, self.blobs.as_ref(), &token, principal)
            .with_concurrency(self.config.max_concurrent_transfers)
            .with_timeout(timeout);
        let restores = relay
            .restore(
                applied.restore_candidates.clone(),
                remote_view.metadata.sync_stamp(),
            )
            .await?;

        // 5. Cut and local delta.
        let cut = self.store.tick();
        let mut delta = DeltaGenerator::new(&self.store).generate_delta(last_sync);
        self.add_local_winners(&mut delta, &applied.conflicts);
        for change in self.store.pending().list_all() {
            if change.operation == ChangeOperation::Delete {
                delta.push_deleted(change.entity_type, change.entity_id);
            }
        }

        // 6. Upload missing attachments.
        let uploads = relay.upload(&mut delta).await?;

        // 7. Push.
        let mut cloud_stamp = remote_view.stamp();
        let mut sync_version = (metadata.sync_version + 1).max(remote_view.metadata.sync_version);
        let mut pushed = 0;
        if !delta.is_empty() {
            let (stamp, version) = self.push(&token, &mut delta, sync_version).await?;
            cloud_stamp = stamp;
            sync_version = version;
            pushed = delta.change_count();
        }

        // 8. Drop pending changes the push covered.
        let queue = self.store.pending();
        let mut pending_removed = 0;
        for change in queue.list_all() {
            let covered = pushed > 0
                && change.timestamp <= cut
                && delta.covers(change.entity_type, &change.entity_id);
            let stale = change.timestamp < last_sync;
            if covered || stale {
                queue.remove(&change.id)?;
                pending_removed += 1;
            }
        }

        // 9. Bookkeeping.
        self.store
            .metadata()
            .record_sync(cut, cloud_stamp, sync_version)?;

        let result = SyncCycleResult {
            since,
            forced_full_sync,
            remote_created,
            remote_updated,
            remote_deleted,
            applied: applied.counters,
            conflicts: applied.conflicts,
            pushed,
            pending_removed,
            uploads,
            restores,
            sync_version,
            duration: started.elapsed(),
        };
        tracing::info!(
            pushed = result.pushed,
            conflicts = result.conflicts.len(),
            pending_removed = result.pending_removed,
            sync_version = result.sync_version,
            duration_ms = result.duration.as_millis() as u64,
            "sync cycle finished"
        );
        Ok(result)
    }

    /// Fetches and decodes the remote document. Missing or unreadable
    /// documents count as empty.
    async fn fetch_document(&self, token: &AccessToken) -> SyncResult<SyncDelta> {
        let bytes = timed(
            self.config.timeout,
            self.remote.fetch(&self.config.principal, token),
        )
        .await?;

        let Some(bytes) = bytes else {
            tracing::debug!("no remote document yet");
            return Ok(SyncDelta::new());
        };
        match SyncDelta::from_json(&bytes) {
            Ok(document) => Ok(document),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    bytes = bytes.len(),
                    "remote document is unreadable, treating it as empty"
                );
                Ok(SyncDelta::new())
            }
        }
    }

    /// Read-modify-write of the remote document, then marks every pushed
    /// entity synced. Returns the document stamp and sync version.
    async fn push(
        &self,
        token: &AccessToken,
        delta: &mut SyncDelta,
        sync_version: u64,
    ) -> SyncResult<(Timestamp, u64)> {
        let mut document = self.fetch_document(token).await?;
        let stamp = now_millis().max(document.stamp() + 1);
        delta.metadata.sync_version = sync_version;
        document.merge_push(delta, stamp);

        let bytes = document.to_json()?;
        timed(
            self.config.timeout,
            self.remote.store(&self.config.principal, token, bytes),
        )
        .await?;

        let version = document.metadata.sync_version;
        for session in delta.sessions.changed() {
            self.store
                .mark_synced(EntityType::Session, session.id(), stamp, version)?;
        }
        for note in delta.notes.changed() {
            self.store
                .mark_synced(EntityType::Note, note.id(), stamp, version)?;
        }
        for image in delta.images.changed() {
            self.store
                .mark_synced(EntityType::Image, image.id(), stamp, version)?;
        }

        tracing::debug!(
            sessions = delta.sessions.len(),
            notes = delta.notes.len(),
            images = delta.images.len(),
            stamp,
            version,
            "local delta pushed"
        );
        Ok((stamp, version))
    }

    /// Adds entities that won a conflict locally but are not in the delta,
    /// so the remote takes the winning version.
    ///
    /// Tied timestamps are left alone: every device keeps its own copy on a
    /// tie, so pushing it would only make the document flip between them.
    fn add_local_winners(&self, delta: &mut SyncDelta, conflicts: &[Conflict]) {
        for conflict in conflicts {
            if conflict.resolution != Resolution::KeepLocal
                || conflict.local_modified == conflict.remote_modified
                || delta.covers(conflict.entity_type, &conflict.entity_id)
            {
                continue;
            }
            match conflict.entity_type {
                EntityType::Session => {
                    if let Some(session) = self.store.get_session(&conflict.entity_id) {
                        delta.sessions.updated.push(session);
                    }
                }
                EntityType::Note => {
                    if let Some(note) = self.store.get_note(&conflict.entity_id) {
                        delta.notes.updated.push(note);
                    }
                }
                EntityType::Image => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Trigger run loop
    // ------------------------------------------------------------------

    /// Drives cycles from triggers until a shutdown message arrives or every
    /// [`TriggerBus`](crate::TriggerBus) is dropped.
    ///
    /// - `LocalMutation` (re)arms the debounce timer; a burst runs one cycle
    ///   once the timer expires.
    /// - `Online` runs a cycle only if the pending queue is non-empty.
    /// - `Mount` and `Manual` run a cycle immediately.
    /// - Non-mutation triggers sent while the previous cycle ran are dropped.
    /// - After a retryable failure the cycle is re-driven with backoff while
    ///   the highest pending retry count is below `max_attempts`.
    pub async fn run(&self, mut triggers: TriggerReceiver) {
        let mut debounce: Option<Instant> = None;
        let mut retry_at: Option<Instant> = None;
        tracing::info!(principal = %self.config.principal, "sync run loop started");

        loop {
            let deadline = match (debounce, retry_at) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };

            let wake = match deadline {
                Some(deadline) => tokio::select! {
                    message = triggers.recv() => Wake::Message(message),
                    _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
                },
                None => Wake::Message(triggers.recv().await),
            };

            match wake {
                Wake::Deadline => {
                    let reason = if debounce.is_some_and(|d| d <= Instant::now()) {
                        "debounce"
                    } else {
                        "retry"
                    };
                    debounce = None;
                    tracing::debug!(reason, "scheduled sync");
                    retry_at = self.drive().await;
                }
                Wake::Message(None) | Wake::Message(Some(Message::Shutdown)) => break,
                Wake::Message(Some(Message::Trigger(trigger, at))) => match trigger {
                    _ if !trigger.is_immediate() => {
                        debounce = Some(Instant::now() + self.config.debounce);
                    }
                    SyncTrigger::Online if self.store.pending().is_empty() => {
                        tracing::debug!("back online with nothing to push");
                    }
                    _ if self.sent_during_last_cycle(at) => {
                        tracing::debug!(%trigger, "trigger arrived mid-cycle, dropped");
                    }
                    _ => {
                        tracing::debug!(%trigger, "sync triggered");
                        debounce = None;
                        retry_at = self.drive().await;
                    }
                },
            }
        }

        tracing::info!("sync run loop stopped");
    }

    fn sent_during_last_cycle(&self, at: Instant) -> bool {
        matches!(*self.last_cycle.lock(), Some((start, end)) if at >= start && at <= end)
    }

    /// Runs one cycle and returns when to retry it, if at all.
    async fn drive(&self) -> Option<Instant> {
        match self.sync().await {
            Ok(_) => None,
            Err(e) if e.is_retryable() => {
                let attempts = self.store.pending().max_retry_count();
                match self.config.retry.backoff(attempts) {
                    Some(delay) => {
                        tracing::debug!(attempts, delay_ms = delay.as_millis() as u64, "sync retry scheduled");
                        Some(Instant::now() + delay)
                    }
                    None => {
                        if attempts > 0 {
                            tracing::warn!(attempts, "retry budget exhausted, waiting for a trigger");
                        }
                        None
                    }
                }
            }
            Err(_) => None,
        }
    }
}

/// Removes entities with a queued local delete from a remote view, so a
/// delete that has not been pushed yet is not undone by the pull. Notes and
/// images of a deleted session go with it.
fn withhold_local_deletes(view: &mut SyncDelta, pending: &[PendingChange]) {
    let mut sessions = HashSet::new();
    for change in pending {
        if change.operation != ChangeOperation::Delete {
            continue;
        }
        view.remove_changed(change.entity_type, &change.entity_id);
        if change.entity_type == EntityType::Session {
            sessions.insert(change.entity_id.as_str());
        }
    }
    if sessions.is_empty() {
        return;
    }

    let orphan = |session_id: &str| sessions.contains(session_id);
    view.notes.created.retain(|n| !orphan(&n.session_id));
    view.notes.updated.retain(|n| !orphan(&n.session_id));
    view.images.created.retain(|i| !orphan(&i.session_id));
    view.images.updated.retain(|i| !orphan(&i.session_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, RemoteFailure, StaticCredentials};

    fn engine(
        store: Arc<LocalStore>,
        remote: Arc<MemoryRemote>,
    ) -> SyncEngine<MemoryRemote, MemoryRemote> {
        SyncEngine::new(
            SyncConfig::new("alice").with_retry(crate::config::RetryConfig::no_retry()),
            store,
            remote.clone(),
            remote,
            Arc::new(StaticCredentials::new("t")),
        )
    }

    #[tokio::test]
    async fn first_cycle_pushes_everything() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemote::new());
        let session = store.create_session("s").unwrap();
        store.create_note(&session.id, "n").unwrap();

        let engine = engine(store.clone(), remote.clone());
        let result = engine.sync().await.unwrap();

        assert_eq!(result.since, 0);
        assert_eq!(result.pushed, 2);
        assert_eq!(result.pending_removed, 2);
        assert_eq!(engine.state(), SyncState::Idle);

        let document = remote.document("alice").unwrap();
        assert_eq!(document.sessions.created.len(), 1);
        assert_eq!(document.notes.created.len(), 1);

        let metadata = store.metadata().get();
        assert_eq!(metadata.sync_version, 1);
        assert_eq!(metadata.last_cloud_timestamp, document.stamp());
        assert!(metadata.last_sync_timestamp > 0);
        assert!(!store.get_session(&session.id).unwrap().is_unsynced());
    }

    #[tokio::test]
    async fn quiet_cycle_pushes_nothing() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemote::new());
        store.create_session("s").unwrap();

        let engine = engine(store.clone(), remote.clone());
        engine.sync().await.unwrap();
        let stores = remote.store_count();

        let result = engine.sync().await.unwrap();
        assert_eq!(result.pushed, 0);
        assert_eq!(remote.store_count(), stores);
        assert!(result.conflicts.is_empty());
    }

    #[tokio::test]
    async fn failure_sets_error_state_and_stats() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemote::new());
        store.create_session("s").unwrap();
        remote.set_fetch_failure(Some(RemoteFailure::Transport));

        let engine = engine(store.clone(), remote.clone());
        let err = engine.sync().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.state(), SyncState::Error);

        let stats = engine.stats();
        assert_eq!(stats.cycles_failed, 1);
        assert!(stats.last_error.is_some());
        assert!(!engine.is_syncing());

        remote.heal();
        engine.sync().await.unwrap();
        assert_eq!(engine.state(), SyncState::Idle);
        assert!(engine.stats().last_error.is_none());
    }

    #[tokio::test]
    async fn concurrent_sync_is_rejected() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemote::new());
        let engine = engine(store, remote);

        engine.in_flight.store(true, Ordering::SeqCst);
        assert!(matches!(
            engine.sync().await,
            Err(SyncError::CycleInProgress)
        ));
        // The rejected call must not clear the running cycle's flag.
        assert!(engine.is_syncing());
    }

    #[tokio::test]
    async fn sync_with_retry_skips_auth_failures() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemote::new());
        store.create_session("s").unwrap();
        remote.set_store_failure(Some(RemoteFailure::Auth));

        let engine = SyncEngine::new(
            SyncConfig::new("alice").with_retry(
                crate::config::RetryConfig::new(3)
                    .with_initial_delay(Duration::from_millis(1))
                    .with_jitter(false),
            ),
            store.clone(),
            remote.clone(),
            remote.clone(),
            Arc::new(StaticCredentials::new("t")),
        );

        // Auth failures are not retried.
        assert!(engine.sync_with_retry().await.unwrap_err().is_auth_failure());
        assert_eq!(engine.stats().retries, 0);

        remote.heal();
        assert!(engine.sync_with_retry().await.is_ok());
    }

    #[test]
    fn queued_deletes_are_withheld_from_the_remote_view() {
        let store = LocalStore::open_in_memory().unwrap();
        let gone = store.create_session("gone").unwrap();
        store.create_note(&gone.id, "child").unwrap();
        let kept = store.create_session("kept").unwrap();
        let mut view = DeltaGenerator::new(&store).generate_delta(0);
        assert_eq!(view.change_count(), 3);

        store.delete_session(&gone.id).unwrap();
        withhold_local_deletes(&mut view, &store.pending().list_all());

        assert_eq!(view.change_count(), 1);
        assert!(view.covers(EntityType::Session, &kept.id));
    }
}
