//! Integration tests for the sync engine against in-process and directory
//! remotes.

use notesync_core::{LocalStore, NotePatch, SessionPatch};
use notesync_protocol::{
    ConflictPolicy, DeltaMetadata, ImageMeta, Note, Session, SyncDelta, Timestamp,
};
use notesync_sync_engine::{
    DeltaApplier, DeltaGenerator, DirectoryRemote, MemoryRemote, RemoteFailure, RetryConfig,
    StaticCredentials, SyncConfig, SyncEngine, SyncError, SyncState, SyncTrigger, TriggerBus,
};
use std::sync::Arc;
use std::time::Duration;

type MemoryEngine = SyncEngine<MemoryRemote, MemoryRemote>;

fn engine_with(
    config: SyncConfig,
    store: &Arc<LocalStore>,
    remote: &Arc<MemoryRemote>,
) -> Arc<MemoryEngine> {
    Arc::new(SyncEngine::new(
        config,
        Arc::clone(store),
        Arc::clone(remote),
        Arc::clone(remote),
        Arc::new(StaticCredentials::new("token")),
    ))
}

/// A fresh in-memory device syncing as "alice" without retries.
fn device(remote: &Arc<MemoryRemote>) -> (Arc<LocalStore>, Arc<MemoryEngine>) {
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let engine = engine_with(
        SyncConfig::new("alice").with_retry(RetryConfig::no_retry()),
        &store,
        remote,
    );
    (store, engine)
}

fn note_contents(store: &LocalStore) -> Vec<(String, String)> {
    let mut notes: Vec<_> = store
        .all_notes()
        .into_iter()
        .map(|n| (n.id, n.content))
        .collect();
    notes.sort();
    notes
}

fn session_titles(store: &LocalStore) -> Vec<(String, String)> {
    let mut sessions: Vec<_> = store
        .list_sessions()
        .into_iter()
        .map(|s| (s.id, s.title))
        .collect();
    sessions.sort();
    sessions
}

fn synced_note(id: &str, content: &str, created_at: Timestamp, last_modified: Timestamp) -> Note {
    Note {
        id: id.into(),
        session_id: "s1".into(),
        content: content.into(),
        created_at,
        last_modified,
        sync_timestamp: Some(created_at),
    }
}

fn remote_with_note(note: Note) -> SyncDelta {
    let mut delta = SyncDelta::new();
    delta.notes.updated.push(note);
    delta.metadata = DeltaMetadata {
        last_local_change_timestamp: 250,
        sync_version: 4,
        updated_at: Some(250),
    };
    delta
}

// ----------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------

#[tokio::test]
async fn offline_session_waits_for_a_successful_push() {
    let remote = Arc::new(MemoryRemote::new());
    let (store, engine) = device(&remote);
    remote.set_fetch_failure(Some(RemoteFailure::Transport));

    let session = store.create_session("Offline").unwrap();
    let pending = store.pending().list_all();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].entity_id, session.id);

    assert!(engine.sync().await.is_err());
    assert!(remote.document("alice").is_none());

    remote.heal();
    engine.sync().await.unwrap();
    let document = remote.document("alice").unwrap();
    assert_eq!(document.sessions.created[0].id, session.id);
    assert!(store.pending().is_empty());
}

#[test]
fn newer_remote_note_replaces_local_without_conflict() {
    let store = LocalStore::open_in_memory().unwrap();
    store
        .upsert_note_from_remote(synced_note("n1", "local", 50, 100))
        .unwrap();

    let outcome = DeltaApplier::new(&store, ConflictPolicy::default())
        .apply_remote_delta(&remote_with_note(synced_note("n1", "remote", 50, 200)))
        .unwrap();

    assert!(outcome.conflicts.is_empty());
    let local = store.get_note("n1").unwrap();
    assert_eq!(local.content, "remote");
    assert_eq!(local.last_modified, 200);
}

#[test]
fn newer_local_note_survives_with_conflict() {
    let store = LocalStore::open_in_memory().unwrap();
    store
        .upsert_note_from_remote(synced_note("n1", "local", 50, 300))
        .unwrap();

    let outcome = DeltaApplier::new(&store, ConflictPolicy::default())
        .apply_remote_delta(&remote_with_note(synced_note("n1", "remote", 50, 200)))
        .unwrap();

    assert_eq!(outcome.conflict_ids(), vec!["note:n1".to_string()]);
    assert_eq!(store.get_note("n1").unwrap().content, "local");
}

#[test]
fn equal_timestamps_keep_local() {
    let store = LocalStore::open_in_memory().unwrap();
    store
        .upsert_note_from_remote(synced_note("n1", "same", 50, 100))
        .unwrap();

    let outcome = DeltaApplier::new(&store, ConflictPolicy::default())
        .apply_remote_delta(&remote_with_note(synced_note("n1", "same", 50, 100)))
        .unwrap();
    assert!(outcome.conflicts.is_empty());
    assert_eq!(outcome.counters.kept_local, 1);
    assert_eq!(store.get_note("n1").unwrap().content, "same");
}

#[tokio::test]
async fn missing_image_bytes_are_restored() {
    let remote = Arc::new(MemoryRemote::new());
    let mut document = SyncDelta::new();
    document.sessions.created.push(Session {
        id: "s1".into(),
        title: "remote".into(),
        created_at: 10,
        last_modified: 10,
        score: 0,
        sync_version: Some(1),
        sync_timestamp: Some(10),
    });
    document.images.created.push(ImageMeta {
        id: "i1".into(),
        session_id: "s1".into(),
        content_type: "image/png".into(),
        created_at: 11,
        blob_ref: Some("blob-1".into()),
        sync_timestamp: Some(11),
    });
    document.metadata.sync_version = 1;
    document.metadata.updated_at = Some(20);
    remote.put_document("alice", document.to_json().unwrap());
    remote.put_blob("blob-1", vec![0xAB; 64]);

    let (store, engine) = device(&remote);
    assert!(store.get_image("i1").unwrap().is_none());

    let result = engine.sync().await.unwrap();
    assert_eq!(result.restores.restored, 1);

    let image = store.get_image("i1").unwrap().unwrap();
    assert_eq!(image.data, vec![0xAB; 64]);
    assert_eq!(image.meta.session_id, "s1");
    assert_eq!(image.meta.content_type, "image/png");
}

#[tokio::test]
async fn wiped_device_recovers_everything() {
    let remote = Arc::new(MemoryRemote::new());

    let (origin, origin_engine) = device(&remote);
    let first = origin.create_session("one").unwrap();
    origin.create_session("two").unwrap();
    origin.create_session("three").unwrap();
    origin
        .update_session(&first.id, SessionPatch::new().with_title("one, edited"))
        .unwrap();
    origin_engine.sync().await.unwrap();
    let document = remote.document("alice").unwrap();
    assert_eq!(document.sessions.created.len(), 2);
    assert_eq!(document.sessions.updated.len(), 1);

    let (wiped, engine) = device(&remote);
    wiped.metadata().record_sync(123_456, 0, 3).unwrap();

    let result = engine.sync().await.unwrap();
    assert_eq!(result.since, 0);
    assert!(result.forced_full_sync);
    assert_eq!(result.remote_created, 3);
    assert_eq!(result.remote_updated, 0);
    assert_eq!(session_titles(&wiped), session_titles(&origin));
}

// ----------------------------------------------------------------------
// Properties
// ----------------------------------------------------------------------

#[test]
fn first_sync_delta_is_complete() {
    let store = LocalStore::open_in_memory().unwrap();
    let session = store.create_session("a").unwrap();
    let note = store.create_note(&session.id, "x").unwrap();
    store
        .update_note(&note.id, NotePatch::new().with_content("y"))
        .unwrap();
    store.add_image(&session.id, "image/png", vec![1]).unwrap();

    let delta = DeltaGenerator::new(&store).generate_delta(0);
    assert_eq!(delta.sessions.created.len(), 1);
    assert_eq!(delta.notes.created.len(), 1);
    assert_eq!(delta.images.created.len(), 1);
    assert!(delta.sessions.updated.is_empty());
    assert!(delta.notes.updated.is_empty());
    assert!(delta.images.updated.is_empty());
}

#[tokio::test]
async fn disjoint_edits_converge() {
    let remote = Arc::new(MemoryRemote::new());
    let (a, engine_a) = device(&remote);
    let (b, engine_b) = device(&remote);

    let session = a.create_session("shared").unwrap();
    let note = a.create_note(&session.id, "v1").unwrap();
    engine_a.sync().await.unwrap();
    engine_b.sync().await.unwrap();
    assert_eq!(note_contents(&a), note_contents(&b));

    a.update_note(&note.id, NotePatch::new().with_content("edited on a"))
        .unwrap();
    b.create_note(&session.id, "new on b").unwrap();
    b.update_session(&session.id, SessionPatch::new().with_score(5))
        .unwrap();

    engine_b.sync().await.unwrap();
    engine_a.sync().await.unwrap();
    engine_b.sync().await.unwrap();

    assert_eq!(note_contents(&a), note_contents(&b));
    assert_eq!(session_titles(&a), session_titles(&b));
    assert_eq!(a.all_notes().len(), 2);
    assert_eq!(a.get_session(&session.id).unwrap().score, 5);
    assert_eq!(b.get_note(&note.id).unwrap().content, "edited on a");
}

#[tokio::test]
async fn genuine_conflict_resolves_to_later_edit() {
    let remote = Arc::new(MemoryRemote::new());
    let (a, engine_a) = device(&remote);
    let (b, engine_b) = device(&remote);

    let session = a.create_session("shared").unwrap();
    let note = a.create_note(&session.id, "v1").unwrap();
    engine_a.sync().await.unwrap();
    engine_b.sync().await.unwrap();

    a.update_note(&note.id, NotePatch::new().with_content("from a"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    b.update_note(&note.id, NotePatch::new().with_content("from b"))
        .unwrap();

    engine_a.sync().await.unwrap();
    let result = engine_b.sync().await.unwrap();
    assert!(result.conflict_ids().contains(&format!("note:{}", note.id)));
    engine_a.sync().await.unwrap();

    assert_eq!(a.get_note(&note.id).unwrap().content, "from b");
    assert_eq!(b.get_note(&note.id).unwrap().content, "from b");
}

#[tokio::test]
async fn tied_divergent_copies_are_not_pushed_back_and_forth() {
    let remote = Arc::new(MemoryRemote::new());
    let mut document = SyncDelta::new();
    document
        .notes
        .created
        .push(synced_note("n1", "remote copy", 100, 100));
    document.metadata.sync_version = 1;
    document.metadata.updated_at = Some(150);
    remote.put_document("alice", document.to_json().unwrap());

    let (store, engine) = device(&remote);
    store
        .upsert_note_from_remote(synced_note("n1", "local copy", 100, 100))
        .unwrap();

    let result = engine.sync().await.unwrap();
    assert_eq!(result.conflict_ids(), vec!["note:n1".to_string()]);
    assert_eq!(result.pushed, 0);
    assert_eq!(remote.store_count(), 0);
    assert_eq!(store.get_note("n1").unwrap().content, "local copy");

    engine.sync().await.unwrap();
    assert_eq!(remote.store_count(), 0);
}

#[tokio::test]
async fn deletes_propagate_and_cascade() {
    let remote = Arc::new(MemoryRemote::new());
    let (a, engine_a) = device(&remote);
    let (b, engine_b) = device(&remote);

    let gone = a.create_session("gone").unwrap();
    a.create_note(&gone.id, "child").unwrap();
    let kept = a.create_session("kept").unwrap();
    engine_a.sync().await.unwrap();
    engine_b.sync().await.unwrap();
    assert_eq!(b.all_notes().len(), 1);

    a.delete_session(&gone.id).unwrap();
    engine_a.sync().await.unwrap();
    assert!(a.pending().is_empty());

    let document = remote.document("alice").unwrap();
    assert!(document.sessions.deleted.contains(&gone.id));

    let result = engine_b.sync().await.unwrap();
    assert_eq!(result.applied.deleted, 2);
    assert!(b.get_session(&gone.id).is_none());
    assert!(b.all_notes().is_empty());
    assert!(b.get_session(&kept.id).is_some());
}

#[tokio::test]
async fn repeated_sync_is_idempotent_and_drains_queue() {
    let remote = Arc::new(MemoryRemote::new());
    let (store, engine) = device(&remote);
    let session = store.create_session("a").unwrap();
    let note = store.create_note(&session.id, "x").unwrap();

    engine.sync().await.unwrap();
    assert!(store.pending().is_empty());

    store
        .update_note(&note.id, NotePatch::new().with_content("y"))
        .unwrap();
    assert_eq!(store.pending().len(), 1);
    let result = engine.sync().await.unwrap();
    assert_eq!(result.pushed, 1);
    assert_eq!(result.pending_removed, 1);
    assert!(store.pending().is_empty());

    // One more cycle picks up the bookkeeping of the last push.
    engine.sync().await.unwrap();
    let sessions = store.list_sessions();
    let notes = store.all_notes();
    let stores = remote.store_count();
    engine.sync().await.unwrap();
    engine.sync().await.unwrap();
    assert_eq!(store.list_sessions(), sessions);
    assert_eq!(store.all_notes(), notes);
    assert_eq!(remote.store_count(), stores);
}

// ----------------------------------------------------------------------
// Failures
// ----------------------------------------------------------------------

#[tokio::test]
async fn auth_failure_leaves_metadata_and_queue_untouched() {
    let remote = Arc::new(MemoryRemote::new());
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let engine = SyncEngine::new(
        SyncConfig::new("alice"),
        Arc::clone(&store),
        Arc::clone(&remote),
        Arc::clone(&remote),
        Arc::new(StaticCredentials::signed_out()),
    );
    store.create_session("a").unwrap();
    let metadata = store.metadata().get();
    let pending = store.pending().list_all();

    let err = engine.sync().await.unwrap_err();
    assert!(err.is_auth_failure());
    assert_eq!(engine.state(), SyncState::Error);
    assert_eq!(store.metadata().get(), metadata);
    assert_eq!(store.pending().list_all(), pending);
    assert_eq!(remote.fetch_count(), 0);
}

#[tokio::test]
async fn rejected_token_aborts_before_any_write() {
    let remote = Arc::new(MemoryRemote::new());
    remote.accept_only("someone-else");
    let (store, engine) = device(&remote);
    store.create_session("a").unwrap();

    assert!(engine.sync().await.unwrap_err().is_auth_failure());
    assert!(remote.document("alice").is_none());
    assert_eq!(store.pending().max_retry_count(), 0);
}

#[tokio::test]
async fn rejected_blob_credential_aborts_the_cycle() {
    let documents = Arc::new(MemoryRemote::new());
    let blobs = Arc::new(MemoryRemote::new());
    blobs.accept_only("someone-else");
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let engine = SyncEngine::new(
        SyncConfig::new("alice").with_retry(RetryConfig::no_retry()),
        Arc::clone(&store),
        Arc::clone(&documents),
        Arc::clone(&blobs),
        Arc::new(StaticCredentials::new("token")),
    );

    let session = store.create_session("s").unwrap();
    store.add_image(&session.id, "image/png", vec![1, 2, 3]).unwrap();

    let err = engine.sync().await.unwrap_err();
    assert!(err.is_auth_failure());
    assert_eq!(engine.state(), SyncState::Error);
    assert!(documents.document("alice").is_none());
    assert_eq!(store.metadata().get().last_sync_timestamp, 0);
    assert_eq!(store.pending().len(), 2);
    assert!(store.pending().list_all().iter().all(|p| p.retry_count == 0));
}

#[tokio::test]
async fn transport_failure_bumps_retry_counts() {
    let remote = Arc::new(MemoryRemote::new());
    let (store, engine) = device(&remote);
    let session = store.create_session("a").unwrap();
    store.create_note(&session.id, "x").unwrap();
    remote.set_store_failure(Some(RemoteFailure::Transport));

    let err = engine.sync().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(store
        .pending()
        .list_all()
        .iter()
        .all(|p| p.retry_count == 1));
    assert_eq!(store.metadata().get().last_sync_timestamp, 0);

    remote.heal();
    engine.sync().await.unwrap();
    assert!(store.pending().is_empty());
}

#[tokio::test]
async fn corrupt_remote_document_is_treated_as_empty() {
    let remote = Arc::new(MemoryRemote::new());
    remote.put_document("alice", b"{\"sessions\": [".to_vec());
    let (store, engine) = device(&remote);
    let session = store.create_session("a").unwrap();

    let result = engine.sync().await.unwrap();
    assert_eq!(result.remote_created, 0);
    assert_eq!(result.pushed, 1);

    let document = remote.document("alice").unwrap();
    assert_eq!(document.sessions.created[0].id, session.id);
}

#[tokio::test]
async fn failed_upload_does_not_block_other_images() {
    let remote = Arc::new(MemoryRemote::new());
    remote.set_transfer_delay(Duration::from_millis(10));
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let engine = engine_with(
        SyncConfig::new("alice")
            .with_retry(RetryConfig::no_retry())
            .with_max_concurrent_transfers(2),
        &store,
        &remote,
    );

    let session = store.create_session("photos").unwrap();
    let images: Vec<_> = (0..6u8)
        .map(|i| store.add_image(&session.id, "image/png", vec![i; 16]).unwrap())
        .collect();
    remote.fail_upload_for(images[2].id.clone());

    let result = engine.sync().await.unwrap();
    assert_eq!(result.uploads.uploaded, 5);
    assert_eq!(result.uploads.failed.len(), 1);
    assert_eq!(result.uploads.failed[0].image_id, images[2].id);
    assert!(remote.max_transfers_in_flight() <= 2);

    let document = remote.document("alice").unwrap();
    assert_eq!(document.images.created.len(), 5);
    assert!(document
        .images
        .created
        .iter()
        .all(|i| i.blob_ref.is_some() && i.id != images[2].id));
    assert!(store.get_image_meta(&images[2].id).unwrap().blob_ref.is_none());

    remote.heal();
    let result = engine.sync().await.unwrap();
    assert_eq!(result.uploads.uploaded, 1);
    assert_eq!(remote.document("alice").unwrap().images.created.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn hanging_remote_times_out() {
    let remote = Arc::new(MemoryRemote::new());
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let engine = engine_with(
        SyncConfig::new("alice")
            .with_retry(RetryConfig::no_retry())
            .with_timeout(Duration::from_secs(1)),
        &store,
        &remote,
    );
    store.create_session("a").unwrap();
    remote.set_fetch_failure(Some(RemoteFailure::Hang));

    let err = engine.sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Timeout));
    assert!(err.is_retryable());
    assert_eq!(store.pending().max_retry_count(), 1);
    assert!(!engine.is_syncing());
}

// ----------------------------------------------------------------------
// Triggers
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn local_mutations_are_debounced_into_one_cycle() {
    let remote = Arc::new(MemoryRemote::new());
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let engine = engine_with(
        SyncConfig::new("alice")
            .with_retry(RetryConfig::no_retry())
            .with_debounce(Duration::from_secs(2)),
        &store,
        &remote,
    );

    let (bus, triggers) = TriggerBus::channel();
    store.changes().observe(Arc::new(bus.clone()));
    let handle = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run(triggers).await }
    });

    for title in ["a", "b", "c"] {
        store.create_session(title).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(remote.fetch_count(), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(remote.store_count(), 1);
    assert_eq!(
        remote.document("alice").unwrap().sessions.created.len(),
        3
    );
    assert!(store.pending().is_empty());

    bus.shutdown();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn manual_trigger_sent_mid_cycle_is_dropped() {
    let remote = Arc::new(MemoryRemote::new());
    let (store, engine) = device(&remote);
    let session = store.create_session("slow").unwrap();
    store.add_image(&session.id, "image/png", vec![7; 16]).unwrap();
    remote.set_transfer_delay(Duration::from_secs(5));

    let (bus, triggers) = TriggerBus::channel();
    let handle = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run(triggers).await }
    });

    bus.send(SyncTrigger::Manual);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(engine.is_syncing());
    bus.send(SyncTrigger::Manual);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.stats().cycles_completed, 1);
    assert_eq!(remote.upload_count(), 1);
    assert!(store.pending().is_empty());

    bus.shutdown();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn online_with_empty_queue_is_ignored() {
    let remote = Arc::new(MemoryRemote::new());
    let (store, engine) = device(&remote);
    store.create_session("a").unwrap();
    engine.sync().await.unwrap();
    let fetches = remote.fetch_count();

    let (bus, triggers) = TriggerBus::channel();
    let handle = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run(triggers).await }
    });

    bus.send(SyncTrigger::Online);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(remote.fetch_count(), fetches);

    // Not observed by the bus, so only the queue says there is work.
    store.create_session("b").unwrap();
    bus.send(SyncTrigger::Online);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(remote.fetch_count() > fetches);
    assert!(store.pending().is_empty());

    bus.shutdown();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_cycles_are_redriven_within_budget() {
    let remote = Arc::new(MemoryRemote::new());
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let engine = engine_with(
        SyncConfig::new("alice").with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_secs(1))
                .with_jitter(false),
        ),
        &store,
        &remote,
    );
    store.create_session("a").unwrap();
    remote.set_store_failure(Some(RemoteFailure::Transport));

    let (bus, triggers) = TriggerBus::channel();
    let handle = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run(triggers).await }
    });

    bus.send(SyncTrigger::Manual);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(engine.stats().cycles_failed, 2);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(engine.stats().cycles_failed, 3);
    assert_eq!(store.pending().max_retry_count(), 3);

    // Budget exhausted: no more automatic attempts.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(engine.stats().cycles_failed, 3);

    remote.heal();
    bus.send(SyncTrigger::Manual);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.state(), SyncState::Idle);
    assert!(store.pending().is_empty());

    bus.shutdown();
    handle.await.unwrap();
}

// ----------------------------------------------------------------------
// Directory remote
// ----------------------------------------------------------------------

#[tokio::test]
async fn directory_remote_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(DirectoryRemote::new(dir.path()));
    let engine_for = |store: &Arc<LocalStore>| {
        SyncEngine::new(
            SyncConfig::new("alice"),
            Arc::clone(store),
            Arc::clone(&remote),
            Arc::clone(&remote),
            Arc::new(StaticCredentials::new("local")),
        )
    };

    let a = Arc::new(LocalStore::open_in_memory().unwrap());
    let session = a.create_session("trip").unwrap();
    a.create_note(&session.id, "day one").unwrap();
    let image = a.add_image(&session.id, "image/jpeg", vec![7; 128]).unwrap();
    engine_for(&a).sync().await.unwrap();

    assert!(dir.path().join("alice").join("document.json").exists());

    let b = Arc::new(LocalStore::open_in_memory().unwrap());
    let result = engine_for(&b).sync().await.unwrap();
    assert_eq!(result.restores.restored, 1);
    assert_eq!(session_titles(&a), session_titles(&b));
    assert_eq!(note_contents(&a), note_contents(&b));
    assert_eq!(b.get_image(&image.id).unwrap().unwrap().data, vec![7; 128]);
}
