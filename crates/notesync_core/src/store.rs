//! The local store facade and journal recovery.

use crate::change_feed::ChangeFeed;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, StoreRecord};
use crate::metadata::MetadataTracker;
use crate::patch::{NotePatch, SessionPatch};
use crate::pending::PendingQueue;
use notesync_protocol::{
    now_millis, ChangeOperation, EntityType, Image, ImageMeta, Note, PendingChange, Session,
    SyncMetadata, Syncable, Timestamp,
};
use notesync_storage::{
    BlobStore, DirBlobStore, FileBackend, InMemoryBackend, MemoryBlobStore, StorageBackend,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Journal file name inside a store directory.
const JOURNAL_FILE: &str = "journal.log";

/// Blob directory name inside a store directory.
const BLOB_DIR: &str = "blobs";

/// In-memory view of the store, rebuilt from the journal on open.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub sessions: HashMap<String, Session>,
    pub notes: HashMap<String, Note>,
    pub images: HashMap<String, ImageMeta>,
    /// Pending changes in enqueue order.
    pub pending: Vec<PendingChange>,
    pub metadata: SyncMetadata,
}

impl State {
    /// Applies one record. Replay and live writes share this path.
    pub fn apply(&mut self, record: &StoreRecord) {
        match record {
            StoreRecord::PutSession { session } => {
                self.sessions.insert(session.id.clone(), session.clone());
            }
            StoreRecord::DeleteSession { id } => {
                self.sessions.remove(id);
                self.notes.retain(|_, n| n.session_id != *id);
                self.images.retain(|_, i| i.session_id != *id);
            }
            StoreRecord::PutNote { note } => {
                self.notes.insert(note.id.clone(), note.clone());
            }
            StoreRecord::DeleteNote { id } => {
                self.notes.remove(id);
            }
            StoreRecord::PutImage { image } => {
                self.images.insert(image.id.clone(), image.clone());
            }
            StoreRecord::DeleteImage { id } => {
                self.images.remove(id);
            }
            StoreRecord::EnqueuePending { change } => {
                self.metadata.last_local_change_timestamp = self
                    .metadata
                    .last_local_change_timestamp
                    .max(change.timestamp);
                self.pending.push(change.clone());
            }
            StoreRecord::UpdatePending { change } => {
                if let Some(slot) = self.pending.iter_mut().find(|p| p.id == change.id) {
                    *slot = change.clone();
                }
            }
            StoreRecord::RemovePending { id } => {
                self.pending.retain(|p| p.id != *id);
            }
            StoreRecord::SetMetadata { metadata } => {
                self.metadata = *metadata;
            }
        }
    }

    /// Records that reproduce the current state from scratch.
    fn snapshot(&self) -> Vec<StoreRecord> {
        let mut records = Vec::with_capacity(
            self.sessions.len() + self.notes.len() + self.images.len() + self.pending.len() + 1,
        );

        records.extend(sorted(self.sessions.values()).into_iter().map(|s| {
            StoreRecord::PutSession {
                session: s.clone(),
            }
        }));
        records.extend(
            sorted(self.notes.values())
                .into_iter()
                .map(|n| StoreRecord::PutNote { note: n.clone() }),
        );
        records.extend(
            sorted(self.images.values())
                .into_iter()
                .map(|i| StoreRecord::PutImage { image: i.clone() }),
        );
        records.extend(self.pending.iter().map(|p| StoreRecord::EnqueuePending {
            change: p.clone(),
        }));
        // Written last: EnqueuePending moves lastLocalChangeTimestamp.
        records.push(StoreRecord::SetMetadata {
            metadata: self.metadata,
        });
        records
    }
}

/// Entities ordered by creation time, then id.
fn sorted<'a, T: Syncable + 'a>(items: impl Iterator<Item = &'a T>) -> Vec<&'a T> {
    let mut items: Vec<&T> = items.collect();
    items.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
    items
}

/// A change event to emit once the write locks are released.
type Emitted = (EntityType, String, ChangeOperation, Timestamp);

/// The local store.
///
/// `LocalStore` is the single owner of sessions, notes, images, the pending
/// change queue and the sync metadata. It is `Send + Sync` and meant to be
/// shared behind an `Arc`.
///
/// # Opening a Store
///
/// ```rust
/// use notesync_core::{LocalStore, NotePatch};
///
/// let store = LocalStore::open_in_memory().unwrap();
/// let session = store.create_session("Field trip").unwrap();
/// let note = store.create_note(&session.id, "first").unwrap();
///
/// let edited = store
///     .update_note(&note.id, NotePatch::new().with_content("second"))
///     .unwrap();
/// assert!(edited.last_modified > edited.created_at);
/// assert_eq!(store.pending().len(), 3);
/// ```
///
/// # Tracked and Untracked Writes
///
/// The user API (`create_*`, `update_*`, `delete_*`, `add_image`) records a
/// [`PendingChange`] and emits a change event. The `*_from_remote` methods,
/// [`mark_synced`](Self::mark_synced) and
/// [`set_image_blob_ref`](Self::set_image_blob_ref) are for the sync engine
/// and do neither.
pub struct LocalStore {
    config: StoreConfig,
    state: RwLock<State>,
    journal: Mutex<Journal>,
    blobs: Box<dyn BlobStore>,
    changes: ChangeFeed,
    /// Last timestamp handed out by [`Self::tick`].
    clock: Mutex<Timestamp>,
}

impl LocalStore {
    /// Opens an in-memory store.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::with_backends(
            StoreConfig::default(),
            Box::new(InMemoryBackend::new()),
            Box::new(MemoryBlobStore::new()),
        )
    }

    /// Opens (or creates) a store in a directory.
    ///
    /// The directory holds `journal.log` and a `blobs/` directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the journal is
    /// corrupted.
    pub fn open(dir: &Path, config: StoreConfig) -> CoreResult<Self> {
        let journal = FileBackend::open_with_create_dirs(&dir.join(JOURNAL_FILE))?;
        let blobs = DirBlobStore::open(&dir.join(BLOB_DIR))?;
        Self::with_backends(config, Box::new(journal), Box::new(blobs))
    }

    /// Opens a store over custom backends, replaying the journal.
    pub fn with_backends(
        config: StoreConfig,
        backend: Box<dyn StorageBackend>,
        blobs: Box<dyn BlobStore>,
    ) -> CoreResult<Self> {
        let mut journal = Journal::new(backend, config.sync_on_write);
        let replay = journal.replay()?;

        let mut state = State::default();
        for record in &replay.records {
            state.apply(record);
        }

        if replay.needs_rewrite {
            if replay.torn_tail {
                tracing::warn!(
                    records = replay.records.len(),
                    "discarded torn journal tail, rewriting journal"
                );
            } else {
                tracing::warn!(
                    records = replay.records.len(),
                    "journal ends without a newline, rewriting journal"
                );
            }
            journal.rewrite(&state.snapshot())?;
        }

        tracing::debug!(
            records = replay.records.len(),
            sessions = state.sessions.len(),
            notes = state.notes.len(),
            images = state.images.len(),
            pending = state.pending.len(),
            "local store opened"
        );

        let clock = state
            .metadata
            .last_local_change_timestamp
            .max(now_millis());

        Ok(Self {
            config,
            state: RwLock::new(state),
            journal: Mutex::new(journal),
            blobs,
            changes: ChangeFeed::new(),
            clock: Mutex::new(clock),
        })
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the change feed.
    pub fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    /// Returns the pending change queue.
    pub fn pending(&self) -> PendingQueue<'_> {
        PendingQueue::new(self)
    }

    /// Returns the sync metadata tracker.
    pub fn metadata(&self) -> MetadataTracker<'_> {
        MetadataTracker::new(self)
    }

    /// Rewrites the journal as a snapshot of the live state.
    pub fn compact(&self) -> CoreResult<()> {
        let state = self.state.read();
        let mut journal = self.journal.lock();
        let before = journal.size()?;
        journal.rewrite(&state.snapshot())?;
        tracing::info!(before, after = journal.size()?, "journal compacted");
        Ok(())
    }

    /// Current journal size in bytes.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.journal.lock().size()
    }

    /// Returns a strictly increasing wall-clock timestamp from the clock
    /// that stamps tracked mutations.
    ///
    /// A tick taken now is greater than every mutation timestamp handed out
    /// before and smaller than every one handed out after.
    pub fn tick(&self) -> Timestamp {
        let mut last = self.clock.lock();
        let next = now_millis().max(*last + 1);
        *last = next;
        next
    }

    // ------------------------------------------------------------------
    // Internals shared with the queue and metadata views
    // ------------------------------------------------------------------

    pub(crate) fn read_state(&self) -> parking_lot::RwLockReadGuard<'_, State> {
        self.state.read()
    }

    /// Journals records and applies them to `state`.
    ///
    /// The caller holds the state write lock, so journal order matches
    /// apply order.
    pub(crate) fn commit(&self, state: &mut State, records: Vec<StoreRecord>) -> CoreResult<()> {
        let mut journal = self.journal.lock();
        journal.append(&records)?;
        for record in &records {
            state.apply(record);
        }

        let threshold = self.config.compact_after_records;
        if threshold > 0 && journal.appended() >= threshold {
            journal.rewrite(&state.snapshot())?;
            tracing::debug!(threshold, "journal compacted automatically");
        }
        Ok(())
    }

    /// Runs `f` with the state write lock and commits the returned records.
    pub(crate) fn write<R>(
        &self,
        f: impl FnOnce(&State) -> CoreResult<(Vec<StoreRecord>, R)>,
    ) -> CoreResult<R> {
        let mut state = self.state.write();
        let (records, result) = f(&state)?;
        self.commit(&mut state, records)?;
        Ok(result)
    }

    /// Builds a fresh pending entry.
    pub(crate) fn new_pending(
        entity_type: EntityType,
        entity_id: &str,
        operation: ChangeOperation,
        payload: Option<serde_json::Value>,
        timestamp: Timestamp,
    ) -> PendingChange {
        PendingChange {
            id: Uuid::new_v4().to_string(),
            entity_type,
            entity_id: entity_id.to_string(),
            operation,
            timestamp,
            payload,
            retry_count: 0,
        }
    }

    fn pending_record(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation: ChangeOperation,
        payload: Option<serde_json::Value>,
        timestamp: Timestamp,
    ) -> StoreRecord {
        StoreRecord::EnqueuePending {
            change: Self::new_pending(entity_type, entity_id, operation, payload, timestamp),
        }
    }

    fn tracked<T: Serialize>(
        &self,
        entity_type: EntityType,
        entity: &T,
        entity_id: &str,
        operation: ChangeOperation,
        timestamp: Timestamp,
    ) -> CoreResult<StoreRecord> {
        let payload = serde_json::to_value(entity)?;
        Ok(self.pending_record(entity_type, entity_id, operation, Some(payload), timestamp))
    }

    fn emit_all(&self, emitted: Vec<Emitted>) {
        for (entity_type, id, operation, timestamp) in emitted {
            self.changes.emit(entity_type, &id, operation, timestamp);
        }
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Creates a session.
    pub fn create_session(&self, title: impl Into<String>) -> CoreResult<Session> {
        let now = self.tick();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: now,
            last_modified: now,
            score: 0,
            sync_version: None,
            sync_timestamp: None,
        };

        let pending = self.tracked(
            EntityType::Session,
            &session,
            &session.id,
            ChangeOperation::Create,
            now,
        )?;
        self.write(|_| {
            Ok((
                vec![
                    StoreRecord::PutSession {
                        session: session.clone(),
                    },
                    pending,
                ],
                (),
            ))
        })?;

        tracing::debug!(id = %session.id, "session created");
        self.changes
            .emit(EntityType::Session, &session.id, ChangeOperation::Create, now);
        Ok(session)
    }

    /// Applies a partial update to a session.
    ///
    /// An empty patch returns the session unchanged.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session does not exist.
    pub fn update_session(&self, id: &str, patch: SessionPatch) -> CoreResult<Session> {
        let now = self.tick();
        let updated = self.write(|state| {
            let current = state
                .sessions
                .get(id)
                .ok_or_else(|| CoreError::session_not_found(id))?;
            if patch.is_empty() {
                return Ok((Vec::new(), (current.clone(), false)));
            }

            let mut session = current.clone();
            if let Some(title) = patch.title {
                session.title = title;
            }
            if let Some(score) = patch.score {
                session.score = score;
            }
            session.last_modified = bump(now, session.created_at, session.last_modified);

            let pending = self.tracked(
                EntityType::Session,
                &session,
                id,
                ChangeOperation::Update,
                session.last_modified,
            )?;
            Ok((
                vec![
                    StoreRecord::PutSession {
                        session: session.clone(),
                    },
                    pending,
                ],
                (session, true),
            ))
        })?;

        let (session, changed) = updated;
        if changed {
            self.changes.emit(
                EntityType::Session,
                id,
                ChangeOperation::Update,
                session.last_modified,
            );
        }
        Ok(session)
    }

    /// Deletes a session together with its notes and images.
    ///
    /// A delete is queued for the session and for every cascaded entity.
    pub fn delete_session(&self, id: &str) -> CoreResult<()> {
        let now = self.tick();
        let (emitted, image_ids) = self.write(|state| {
            if !state.sessions.contains_key(id) {
                return Err(CoreError::session_not_found(id));
            }

            let mut records = Vec::new();
            let mut emitted = Vec::new();
            let mut image_ids = Vec::new();

            for note in state.notes.values().filter(|n| n.session_id == id) {
                records.push(self.pending_record(
                    EntityType::Note,
                    &note.id,
                    ChangeOperation::Delete,
                    None,
                    now,
                ));
                emitted.push((EntityType::Note, note.id.clone(), ChangeOperation::Delete, now));
            }
            for image in state.images.values().filter(|i| i.session_id == id) {
                records.push(self.pending_record(
                    EntityType::Image,
                    &image.id,
                    ChangeOperation::Delete,
                    None,
                    now,
                ));
                emitted.push((EntityType::Image, image.id.clone(), ChangeOperation::Delete, now));
                image_ids.push(image.id.clone());
            }
            records.push(self.pending_record(
                EntityType::Session,
                id,
                ChangeOperation::Delete,
                None,
                now,
            ));
            emitted.push((EntityType::Session, id.to_string(), ChangeOperation::Delete, now));
            records.push(StoreRecord::DeleteSession { id: id.to_string() });

            Ok((records, (emitted, image_ids)))
        })?;

        self.drop_blobs(&image_ids);
        tracing::debug!(id, cascaded = emitted.len() - 1, "session deleted");
        self.emit_all(emitted);
        Ok(())
    }

    /// Returns a session by id.
    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.state.read().sessions.get(id).cloned()
    }

    /// Lists all sessions ordered by creation time.
    pub fn list_sessions(&self) -> Vec<Session> {
        let state = self.state.read();
        sorted(state.sessions.values()).into_iter().cloned().collect()
    }

    /// Number of sessions.
    pub fn session_count(&self) -> usize {
        self.state.read().sessions.len()
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Creates a note in an existing session.
    pub fn create_note(&self, session_id: &str, content: impl Into<String>) -> CoreResult<Note> {
        let now = self.tick();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            content: content.into(),
            created_at: now,
            last_modified: now,
            sync_timestamp: None,
        };

        let pending = self.tracked(
            EntityType::Note,
            &note,
            &note.id,
            ChangeOperation::Create,
            now,
        )?;
        self.write(|state| {
            if !state.sessions.contains_key(session_id) {
                return Err(CoreError::session_not_found(session_id));
            }
            Ok((
                vec![StoreRecord::PutNote { note: note.clone() }, pending],
                (),
            ))
        })?;

        self.changes
            .emit(EntityType::Note, &note.id, ChangeOperation::Create, now);
        Ok(note)
    }

    /// Applies a partial update to a note.
    ///
    /// An empty patch returns the note unchanged.
    pub fn update_note(&self, id: &str, patch: NotePatch) -> CoreResult<Note> {
        let now = self.tick();
        let (note, changed) = self.write(|state| {
            let current = state
                .notes
                .get(id)
                .ok_or_else(|| CoreError::entity_not_found(EntityType::Note, id))?;
            let Some(content) = patch.content else {
                return Ok((Vec::new(), (current.clone(), false)));
            };

            let mut note = current.clone();
            note.content = content;
            note.last_modified = bump(now, note.created_at, note.last_modified);

            let pending = self.tracked(
                EntityType::Note,
                &note,
                id,
                ChangeOperation::Update,
                note.last_modified,
            )?;
            Ok((
                vec![StoreRecord::PutNote { note: note.clone() }, pending],
                (note, true),
            ))
        })?;

        if changed {
            self.changes.emit(
                EntityType::Note,
                id,
                ChangeOperation::Update,
                note.last_modified,
            );
        }
        Ok(note)
    }

    /// Deletes a note.
    pub fn delete_note(&self, id: &str) -> CoreResult<()> {
        let now = self.tick();
        self.write(|state| {
            if !state.notes.contains_key(id) {
                return Err(CoreError::entity_not_found(EntityType::Note, id));
            }
            Ok((
                vec![
                    self.pending_record(EntityType::Note, id, ChangeOperation::Delete, None, now),
                    StoreRecord::DeleteNote { id: id.to_string() },
                ],
                (),
            ))
        })?;

        self.changes
            .emit(EntityType::Note, id, ChangeOperation::Delete, now);
        Ok(())
    }

    /// Returns a note by id.
    pub fn get_note(&self, id: &str) -> Option<Note> {
        self.state.read().notes.get(id).cloned()
    }

    /// Lists the notes of a session ordered by creation time.
    pub fn list_notes(&self, session_id: &str) -> Vec<Note> {
        let state = self.state.read();
        sorted(state.notes.values().filter(|n| n.session_id == session_id))
            .into_iter()
            .cloned()
            .collect()
    }

    /// Lists every note ordered by creation time.
    pub fn all_notes(&self) -> Vec<Note> {
        let state = self.state.read();
        sorted(state.notes.values()).into_iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// Adds an image to an existing session.
    ///
    /// The bytes are written to the blob store before the metadata is
    /// journaled.
    pub fn add_image(
        &self,
        session_id: &str,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> CoreResult<ImageMeta> {
        if self.get_session(session_id).is_none() {
            return Err(CoreError::session_not_found(session_id));
        }

        let now = self.tick();
        let meta = ImageMeta {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            content_type: content_type.into(),
            created_at: now,
            blob_ref: None,
            sync_timestamp: None,
        };
        self.blobs.put(&meta.id, &data)?;

        let pending = self.tracked(
            EntityType::Image,
            &meta,
            &meta.id,
            ChangeOperation::Create,
            now,
        )?;
        let written = self.write(|state| {
            // The session may have been deleted while the bytes were written.
            if !state.sessions.contains_key(session_id) {
                return Err(CoreError::session_not_found(session_id));
            }
            Ok((
                vec![
                    StoreRecord::PutImage {
                        image: meta.clone(),
                    },
                    pending,
                ],
                (),
            ))
        });
        if let Err(e) = written {
            self.drop_blobs(std::slice::from_ref(&meta.id));
            return Err(e);
        }

        tracing::debug!(id = %meta.id, bytes = data.len(), "image added");
        self.changes
            .emit(EntityType::Image, &meta.id, ChangeOperation::Create, now);
        Ok(meta)
    }

    /// Deletes an image and its bytes.
    pub fn delete_image(&self, id: &str) -> CoreResult<()> {
        let now = self.tick();
        self.write(|state| {
            if !state.images.contains_key(id) {
                return Err(CoreError::entity_not_found(EntityType::Image, id));
            }
            Ok((
                vec![
                    self.pending_record(EntityType::Image, id, ChangeOperation::Delete, None, now),
                    StoreRecord::DeleteImage { id: id.to_string() },
                ],
                (),
            ))
        })?;

        self.drop_blobs(&[id.to_string()]);
        self.changes
            .emit(EntityType::Image, id, ChangeOperation::Delete, now);
        Ok(())
    }

    /// Returns an image with its bytes.
    ///
    /// Returns `None` if the metadata is unknown or the bytes are not stored
    /// locally (yet).
    pub fn get_image(&self, id: &str) -> CoreResult<Option<Image>> {
        let Some(meta) = self.get_image_meta(id) else {
            return Ok(None);
        };
        Ok(self.blobs.get(id)?.map(|data| Image { meta, data }))
    }

    /// Returns image metadata by id.
    pub fn get_image_meta(&self, id: &str) -> Option<ImageMeta> {
        self.state.read().images.get(id).cloned()
    }

    /// Lists the image metadata of a session ordered by creation time.
    pub fn list_images(&self, session_id: &str) -> Vec<ImageMeta> {
        let state = self.state.read();
        sorted(state.images.values().filter(|i| i.session_id == session_id))
            .into_iter()
            .cloned()
            .collect()
    }

    /// Lists every image metadata record ordered by creation time.
    pub fn all_images(&self) -> Vec<ImageMeta> {
        let state = self.state.read();
        sorted(state.images.values()).into_iter().cloned().collect()
    }

    /// Returns true if the bytes of an image are stored locally.
    pub fn has_image_blob(&self, id: &str) -> CoreResult<bool> {
        Ok(self.blobs.contains(id)?)
    }

    /// Best-effort removal of blob bytes after their metadata is gone.
    fn drop_blobs(&self, ids: &[String]) {
        for id in ids {
            if let Err(e) = self.blobs.delete(id) {
                tracing::warn!(id = %id, error = %e, "failed to delete image bytes");
            }
        }
    }

    // ------------------------------------------------------------------
    // Sync-side writes (untracked)
    // ------------------------------------------------------------------

    /// Inserts or replaces a session received from the remote.
    pub fn upsert_session_from_remote(&self, session: Session) -> CoreResult<()> {
        self.write(|_| Ok((vec![StoreRecord::PutSession { session }], ())))
    }

    /// Inserts or replaces a note received from the remote.
    pub fn upsert_note_from_remote(&self, note: Note) -> CoreResult<()> {
        self.write(|_| Ok((vec![StoreRecord::PutNote { note }], ())))
    }

    /// Inserts or replaces image metadata received from the remote.
    pub fn upsert_image_meta_from_remote(&self, image: ImageMeta) -> CoreResult<()> {
        self.write(|_| Ok((vec![StoreRecord::PutImage { image }], ())))
    }

    /// Persists a downloaded image: bytes first, then metadata.
    pub fn insert_image_from_remote(&self, image: ImageMeta, data: &[u8]) -> CoreResult<()> {
        self.blobs.put(&image.id, data)?;
        self.upsert_image_meta_from_remote(image)
    }

    /// Deletes a session (cascading) on behalf of the remote.
    ///
    /// Returns false if the session was not present.
    pub fn delete_session_from_remote(&self, id: &str) -> CoreResult<bool> {
        let image_ids = self.write(|state| {
            if !state.sessions.contains_key(id) {
                return Ok((Vec::new(), None));
            }
            let image_ids: Vec<String> = state
                .images
                .values()
                .filter(|i| i.session_id == id)
                .map(|i| i.id.clone())
                .collect();
            Ok((
                vec![StoreRecord::DeleteSession { id: id.to_string() }],
                Some(image_ids),
            ))
        })?;

        match image_ids {
            Some(ids) => {
                self.drop_blobs(&ids);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deletes a note on behalf of the remote.
    pub fn delete_note_from_remote(&self, id: &str) -> CoreResult<bool> {
        self.write(|state| {
            if !state.notes.contains_key(id) {
                return Ok((Vec::new(), false));
            }
            Ok((vec![StoreRecord::DeleteNote { id: id.to_string() }], true))
        })
    }

    /// Deletes an image and its bytes on behalf of the remote.
    pub fn delete_image_from_remote(&self, id: &str) -> CoreResult<bool> {
        let removed = self.write(|state| {
            if !state.images.contains_key(id) {
                return Ok((Vec::new(), false));
            }
            Ok((vec![StoreRecord::DeleteImage { id: id.to_string() }], true))
        })?;
        if removed {
            self.drop_blobs(&[id.to_string()]);
        }
        Ok(removed)
    }

    /// Records sync bookkeeping on an entity without touching its content.
    ///
    /// Returns false if the entity does not exist.
    pub fn mark_synced(
        &self,
        entity_type: EntityType,
        id: &str,
        timestamp: Timestamp,
        version: u64,
    ) -> CoreResult<bool> {
        self.write(|state| {
            let record = match entity_type {
                EntityType::Session => state.sessions.get(id).map(|s| {
                    let mut session = s.clone();
                    session.mark_synced(timestamp, version);
                    StoreRecord::PutSession { session }
                }),
                EntityType::Note => state.notes.get(id).map(|n| {
                    let mut note = n.clone();
                    note.mark_synced(timestamp, version);
                    StoreRecord::PutNote { note }
                }),
                EntityType::Image => state.images.get(id).map(|i| {
                    let mut image = i.clone();
                    image.mark_synced(timestamp, version);
                    StoreRecord::PutImage { image }
                }),
            };
            let found = record.is_some();
            Ok((record.into_iter().collect(), found))
        })
    }

    /// Persists the remote blob reference of an image.
    pub fn set_image_blob_ref(&self, id: &str, blob_ref: impl Into<String>) -> CoreResult<ImageMeta> {
        let blob_ref = blob_ref.into();
        self.write(|state| {
            let mut image = state
                .images
                .get(id)
                .cloned()
                .ok_or_else(|| CoreError::entity_not_found(EntityType::Image, id))?;
            image.blob_ref = Some(blob_ref);
            Ok((
                vec![StoreRecord::PutImage {
                    image: image.clone(),
                }],
                image,
            ))
        })
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("LocalStore")
            .field("sessions", &state.sessions.len())
            .field("notes", &state.notes.len())
            .field("images", &state.images.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

/// Next `lastModified` for an update: strictly after both the creation
/// time and the previous modification, even within one millisecond or
/// when the entity came from a device with a faster clock.
fn bump(now: Timestamp, created_at: Timestamp, last_modified: Timestamp) -> Timestamp {
    now.max(created_at + 1).max(last_modified + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_is_strictly_after() {
        assert_eq!(bump(100, 100, 100), 101);
        assert_eq!(bump(500, 100, 200), 500);
        assert_eq!(bump(100, 900, 900), 901);
    }

    #[test]
    fn tick_is_strictly_increasing() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut last = 0;
        for _ in 0..1000 {
            let next = store.tick();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn create_session_enqueues_and_emits() {
        let store = LocalStore::open_in_memory().unwrap();
        let rx = store.changes().subscribe();

        let session = store.create_session("Morning").unwrap();

        assert_eq!(session.created_at, session.last_modified);
        assert!(session.sync_timestamp.is_none());

        let pending = store.pending().list_all();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, session.id);
        assert_eq!(pending[0].operation, ChangeOperation::Create);
        assert_eq!(pending[0].payload.as_ref().unwrap()["title"], "Morning");

        let change = rx.try_recv().unwrap();
        assert_eq!(change.entity_type, EntityType::Session);
        assert_eq!(
            store.metadata().get().last_local_change_timestamp,
            session.created_at
        );
    }

    #[test]
    fn update_bumps_last_modified() {
        let store = LocalStore::open_in_memory().unwrap();
        let session = store.create_session("a").unwrap();

        let updated = store
            .update_session(&session.id, SessionPatch::new().with_title("b").with_score(3))
            .unwrap();
        assert!(updated.last_modified > updated.created_at);
        assert_eq!(updated.score, 3);

        let again = store
            .update_session(&session.id, SessionPatch::new().with_score(4))
            .unwrap();
        assert!(again.last_modified > updated.last_modified);
    }

    #[test]
    fn empty_patch_is_a_no_op() {
        let store = LocalStore::open_in_memory().unwrap();
        let session = store.create_session("a").unwrap();
        let note = store.create_note(&session.id, "x").unwrap();

        let same = store.update_session(&session.id, SessionPatch::new()).unwrap();
        assert_eq!(same, session);
        let same = store.update_note(&note.id, NotePatch::new()).unwrap();
        assert_eq!(same, note);

        assert_eq!(store.pending().len(), 2);
    }

    #[test]
    fn note_requires_session() {
        let store = LocalStore::open_in_memory().unwrap();
        let err = store.create_note("missing", "x").unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound { .. }));
        assert!(store.pending().is_empty());

        let err = store.add_image("missing", "image/png", vec![1]).unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound { .. }));
    }

    #[test]
    fn delete_session_cascades_and_queues_tombstones() {
        let store = LocalStore::open_in_memory().unwrap();
        let session = store.create_session("a").unwrap();
        let note = store.create_note(&session.id, "x").unwrap();
        let image = store.add_image(&session.id, "image/png", vec![1, 2]).unwrap();
        let other = store.create_session("b").unwrap();
        store.create_note(&other.id, "kept").unwrap();

        store.delete_session(&session.id).unwrap();

        assert!(store.get_note(&note.id).is_none());
        assert!(store.get_image_meta(&image.id).is_none());
        assert!(!store.has_image_blob(&image.id).unwrap());
        assert_eq!(store.all_notes().len(), 1);

        let deletes: Vec<_> = store
            .pending()
            .list_all()
            .into_iter()
            .filter(|p| p.operation == ChangeOperation::Delete)
            .map(|p| (p.entity_type, p.entity_id))
            .collect();
        assert_eq!(deletes.len(), 3);
        assert!(deletes.contains(&(EntityType::Note, note.id.clone())));
        assert!(deletes.contains(&(EntityType::Image, image.id.clone())));
        assert!(deletes.contains(&(EntityType::Session, session.id.clone())));
    }

    #[test]
    fn remote_writes_are_untracked() {
        let store = LocalStore::open_in_memory().unwrap();
        let rx = store.changes().subscribe();

        store
            .upsert_session_from_remote(Session {
                id: "s1".into(),
                title: "remote".into(),
                created_at: 10,
                last_modified: 10,
                score: 0,
                sync_version: Some(1),
                sync_timestamp: Some(10),
            })
            .unwrap();
        assert!(store.mark_synced(EntityType::Session, "s1", 20, 2).unwrap());
        assert!(!store.mark_synced(EntityType::Note, "nope", 20, 2).unwrap());
        assert!(store.delete_session_from_remote("s1").unwrap());
        assert!(!store.delete_session_from_remote("s1").unwrap());

        assert!(store.pending().is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(store.metadata().get(), SyncMetadata::default());
    }

    #[test]
    fn image_bytes_round_trip() {
        let store = LocalStore::open_in_memory().unwrap();
        let session = store.create_session("a").unwrap();
        let meta = store.add_image(&session.id, "image/jpeg", vec![9; 32]).unwrap();

        let image = store.get_image(&meta.id).unwrap().unwrap();
        assert_eq!(image.data, vec![9; 32]);
        assert_eq!(image.meta.content_type, "image/jpeg");

        let patched = store.set_image_blob_ref(&meta.id, "blob-1").unwrap();
        assert_eq!(patched.blob_ref.as_deref(), Some("blob-1"));
        // Untracked.
        assert_eq!(store.pending().len(), 2);
    }

    #[test]
    fn metadata_without_bytes_is_not_an_image() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .upsert_image_meta_from_remote(ImageMeta {
                id: "i1".into(),
                session_id: "s1".into(),
                content_type: "image/png".into(),
                created_at: 1,
                blob_ref: Some("r1".into()),
                sync_timestamp: Some(1),
            })
            .unwrap();

        assert!(store.get_image_meta("i1").is_some());
        assert!(store.get_image("i1").unwrap().is_none());
        assert!(!store.has_image_blob("i1").unwrap());
    }

    #[test]
    fn automatic_compaction() {
        let backend = InMemoryBackend::new();
        let store = LocalStore::with_backends(
            StoreConfig::new().compact_after_records(4),
            Box::new(backend.clone()),
            Box::new(MemoryBlobStore::new()),
        )
        .unwrap();

        let session = store.create_session("a").unwrap();
        for i in 0..5 {
            store
                .update_session(&session.id, SessionPatch::new().with_score(i))
                .unwrap();
        }

        let reopened = LocalStore::with_backends(
            StoreConfig::default(),
            Box::new(backend),
            Box::new(MemoryBlobStore::new()),
        )
        .unwrap();
        assert_eq!(reopened.get_session(&session.id).unwrap().score, 4);
        assert_eq!(reopened.pending().len(), 6);
    }
}
