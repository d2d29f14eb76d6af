//! Journal records and the journal writer.
//!
//! The journal is a JSON-lines log: one [`StoreRecord`] per line, each line
//! terminated by `\n`. Replaying every record in order against an empty
//! state reproduces the store.
//!
//! A final line without its terminating newline is a torn append from a
//! crash and is discarded. Any other undecodable line is corruption.

use crate::error::{CoreError, CoreResult};
use notesync_protocol::{ImageMeta, Note, PendingChange, Session, SyncMetadata};
use notesync_storage::StorageBackend;
use serde::{Deserialize, Serialize};

/// A journaled store mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub(crate) enum StoreRecord {
    /// Insert or replace a session.
    PutSession {
        /// The session.
        session: Session,
    },
    /// Delete a session together with its notes and images.
    DeleteSession {
        /// Session id.
        id: String,
    },
    /// Insert or replace a note.
    PutNote {
        /// The note.
        note: Note,
    },
    /// Delete a note.
    DeleteNote {
        /// Note id.
        id: String,
    },
    /// Insert or replace image metadata.
    PutImage {
        /// The image metadata.
        image: ImageMeta,
    },
    /// Delete an image.
    DeleteImage {
        /// Image id.
        id: String,
    },
    /// Append an entry to the pending change queue.
    EnqueuePending {
        /// The entry.
        change: PendingChange,
    },
    /// Replace an existing pending entry (retry bookkeeping).
    UpdatePending {
        /// The entry.
        change: PendingChange,
    },
    /// Remove a pending entry.
    RemovePending {
        /// Entry id.
        id: String,
    },
    /// Replace the sync metadata record.
    SetMetadata {
        /// The metadata.
        metadata: SyncMetadata,
    },
}

impl StoreRecord {
    /// Encodes the record as one journal line.
    fn encode_into(&self, buf: &mut Vec<u8>) -> CoreResult<()> {
        serde_json::to_writer(&mut *buf, self)?;
        buf.push(b'\n');
        Ok(())
    }
}

/// Result of reading a journal back.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    /// Decoded records in journal order.
    pub records: Vec<StoreRecord>,
    /// Whether a torn final line was discarded.
    pub torn_tail: bool,
    /// The journal does not end with a newline, so the next append would
    /// land on the same line. Holds for every torn tail and for a complete
    /// final record that lost its newline.
    pub needs_rewrite: bool,
}

/// Decodes a journal image.
pub(crate) fn decode(bytes: &[u8]) -> CoreResult<Replay> {
    let mut replay = Replay::default();
    let complete = bytes.is_empty() || bytes.ends_with(b"\n");
    replay.needs_rewrite = !complete;
    let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
    // `split` yields a trailing empty slice when the input ends with '\n'.
    let last = lines.len().saturating_sub(1);

    for (index, line) in lines.iter().enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<StoreRecord>(line) {
            Ok(record) => replay.records.push(record),
            Err(_) if index == last && !complete => {
                replay.torn_tail = true;
            }
            Err(e) => {
                return Err(CoreError::corrupted(format!(
                    "line {}: {}",
                    index + 1,
                    e
                )));
            }
        }
    }

    Ok(replay)
}

/// Appends records to a storage backend.
pub(crate) struct Journal {
    backend: Box<dyn StorageBackend>,
    sync_on_write: bool,
    /// Records appended since the last rewrite.
    appended: usize,
}

impl Journal {
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> Self {
        Self {
            backend,
            sync_on_write,
            appended: 0,
        }
    }

    /// Reads and decodes the whole journal.
    pub fn replay(&self) -> CoreResult<Replay> {
        let bytes = self.backend.read_all()?;
        decode(&bytes)
    }

    /// Appends records as one write.
    pub fn append(&mut self, records: &[StoreRecord]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for record in records {
            record.encode_into(&mut buf)?;
        }

        self.backend.append(&buf)?;
        if self.sync_on_write {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }

        self.appended += records.len();
        Ok(())
    }

    /// Atomically replaces the journal with the given records.
    pub fn rewrite(&mut self, records: &[StoreRecord]) -> CoreResult<()> {
        let mut buf = Vec::new();
        for record in records {
            record.encode_into(&mut buf)?;
        }

        self.backend.replace(&buf)?;
        self.appended = 0;
        Ok(())
    }

    /// Number of records appended since the last rewrite.
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Current journal size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }
}
