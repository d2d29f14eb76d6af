//! Remote delta application.
//!
//! Folds a remote delta (or a snapshot of the remote document) into the
//! local store through the store's untracked write path, so nothing applied
//! here is queued for push again.
//!
//! Every entity taken from the remote is stamped with the envelope's
//! [`sync_stamp`](notesync_protocol::DeltaMetadata::sync_stamp). The stamp
//! depends only on the envelope, so applying the same envelope twice writes
//! nothing the second time.

use crate::error::SyncResult;
use notesync_core::LocalStore;
use notesync_protocol::{
    Conflict, ConflictPolicy, EntityDelta, ImageMeta, Resolution, SyncDelta, Syncable, Timestamp,
};

/// Per-cycle counters of what the applier did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyCounters {
    /// Remote entities that did not exist locally.
    pub inserted: usize,
    /// Local entities replaced by their remote version.
    pub overwritten: usize,
    /// Entities where the local version was kept.
    pub kept_local: usize,
    /// Local entities removed by remote tombstones.
    pub deleted: usize,
    /// Local images whose blob reference was taken from the remote.
    pub images_patched: usize,
}

/// Result of applying one remote delta.
///
/// Conflicts resolved in favor of the local copy leave that copy marked
/// synced; the orchestrator re-pushes it so the remote converges.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// What was written.
    pub counters: ApplyCounters,
    /// Conflicts detected and resolved.
    pub conflicts: Vec<Conflict>,
    /// Remote images whose bytes are not stored locally.
    pub restore_candidates: Vec<ImageMeta>,
}

impl ApplyOutcome {
    /// Conflict identifiers, `"<type>:<id>"`.
    pub fn conflict_ids(&self) -> Vec<String> {
        self.conflicts.iter().map(Conflict::id).collect()
    }
}

/// Applies remote deltas to a [`LocalStore`].
pub struct DeltaApplier<'a> {
    store: &'a LocalStore,
    policy: ConflictPolicy,
}

impl<'a> DeltaApplier<'a> {
    /// Creates an applier with the given conflict policy.
    pub fn new(store: &'a LocalStore, policy: ConflictPolicy) -> Self {
        Self { store, policy }
    }

    /// Applies a remote delta.
    ///
    /// Upserts go first (sessions, notes, image metadata), then tombstones.
    /// Image bytes are never transferred here; images that are missing
    /// locally come back as restore candidates.
    pub fn apply_remote_delta(&self, delta: &SyncDelta) -> SyncResult<ApplyOutcome> {
        let stamp = delta.metadata.sync_stamp();
        let version = delta.metadata.sync_version;
        let mut outcome = ApplyOutcome::default();

        self.apply_entities(
            &delta.sessions,
            stamp,
            version,
            &mut outcome,
            |id| self.store.get_session(id),
            |session| self.store.upsert_session_from_remote(session),
        )?;
        self.apply_entities(
            &delta.notes,
            stamp,
            version,
            &mut outcome,
            |id| self.store.get_note(id),
            |note| self.store.upsert_note_from_remote(note),
        )?;
        self.apply_images(&delta.images, stamp, version, &mut outcome)?;

        for id in &delta.notes.deleted {
            if self.store.delete_note_from_remote(id)? {
                outcome.counters.deleted += 1;
            }
        }
        for id in &delta.images.deleted {
            if self.store.delete_image_from_remote(id)? {
                outcome.counters.deleted += 1;
            }
            outcome.restore_candidates.retain(|c| c.id != *id);
        }
        for id in &delta.sessions.deleted {
            if self.store.delete_session_from_remote(id)? {
                outcome.counters.deleted += 1;
            }
            outcome.restore_candidates.retain(|c| c.session_id != *id);
        }

        let c = outcome.counters;
        tracing::debug!(
            inserted = c.inserted,
            overwritten = c.overwritten,
            kept_local = c.kept_local,
            deleted = c.deleted,
            images_patched = c.images_patched,
            conflicts = outcome.conflicts.len(),
            restore = outcome.restore_candidates.len(),
            "remote delta applied"
        );
        Ok(outcome)
    }

    fn apply_entities<T: Syncable + PartialEq>(
        &self,
        delta: &EntityDelta<T>,
        stamp: Timestamp,
        version: u64,
        outcome: &mut ApplyOutcome,
        get: impl Fn(&str) -> Option<T>,
        put: impl Fn(T) -> notesync_core::CoreResult<()>,
    ) -> SyncResult<()> {
        for remote in delta.changed() {
            if delta.deleted.iter().any(|d| d == remote.id()) {
                continue;
            }

            let Some(local) = get(remote.id()) else {
                let mut incoming = remote.clone();
                incoming.mark_synced(stamp, version);
                put(incoming)?;
                outcome.counters.inserted += 1;
                continue;
            };

            let (resolution, conflict) = self.policy.evaluate(&local, remote);
            if let Some(conflict) = conflict {
                tracing::warn!(
                    entity_type = %conflict.entity_type,
                    entity_id = %conflict.entity_id,
                    local_modified = conflict.local_modified,
                    remote_modified = conflict.remote_modified,
                    resolution = ?conflict.resolution,
                    policy = %self.policy,
                    "sync conflict"
                );
                outcome.conflicts.push(conflict);
            }

            let next = match resolution {
                Resolution::AcceptRemote => {
                    outcome.counters.overwritten += 1;
                    let mut incoming = remote.clone();
                    incoming.mark_synced(stamp, version);
                    incoming
                }
                Resolution::KeepLocal => {
                    outcome.counters.kept_local += 1;
                    let mut kept = local.clone();
                    kept.mark_synced(stamp, version);
                    kept
                }
            };

            if next != local {
                put(next)?;
            }
        }
        Ok(())
    }

    fn apply_images(
        &self,
        delta: &EntityDelta<ImageMeta>,
        stamp: Timestamp,
        version: u64,
        outcome: &mut ApplyOutcome,
    ) -> SyncResult<()> {
        for remote in delta.changed() {
            if delta.deleted.iter().any(|d| d == &remote.id) {
                continue;
            }

            if !self.store.has_image_blob(&remote.id)? {
                outcome.restore_candidates.push(remote.clone());
                continue;
            }

            let local = self.store.get_image_meta(&remote.id);
            let mut next = local.clone().unwrap_or_else(|| remote.clone());
            if remote.blob_ref.is_some() && next.blob_ref != remote.blob_ref {
                next.blob_ref = remote.blob_ref.clone();
                outcome.counters.images_patched += 1;
            }
            next.mark_synced(stamp, version);

            if local.as_ref() != Some(&next) {
                self.store.upsert_image_meta_from_remote(next)?;
            }
        }
        Ok(())
    }
}
