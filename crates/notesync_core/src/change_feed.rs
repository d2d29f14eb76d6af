//! Change feed for observing tracked local mutations.
//!
//! Every user-facing mutation of the [`LocalStore`](crate::LocalStore)
//! emits one [`LocalChange`] per affected entity after it is journaled.
//! Writes made by the sync engine are not emitted.
//!
//! Two ways to listen:
//! - [`ChangeFeed::subscribe`] returns a channel receiver
//! - [`ChangeFeed::observe`] registers a [`ChangeObserver`] that is called
//!   synchronously on the mutating thread
//!
//! # Usage
//!
//! ```rust
//! use notesync_core::LocalStore;
//!
//! let store = LocalStore::open_in_memory().unwrap();
//! let receiver = store.changes().subscribe();
//!
//! store.create_session("Morning").unwrap();
//! let change = receiver.recv().unwrap();
//! assert_eq!(change.sequence, 1);
//! ```

use notesync_protocol::{ChangeOperation, EntityType, Timestamp};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// A single tracked local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalChange {
    /// Feed sequence number, starting at 1.
    pub sequence: u64,
    /// Type of the mutated entity.
    pub entity_type: EntityType,
    /// Id of the mutated entity.
    pub entity_id: String,
    /// Mutation kind.
    pub operation: ChangeOperation,
    /// Time of the mutation.
    pub timestamp: Timestamp,
}

/// Receives tracked local mutations.
///
/// Called with the store's locks released. Implementations must not block.
pub trait ChangeObserver: Send + Sync {
    /// Called once per emitted change.
    fn on_change(&self, change: &LocalChange);
}

/// Distributes tracked local mutations to subscribers and observers.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<LocalChange>>>,
    observers: RwLock<Vec<Arc<dyn ChangeObserver>>>,
    sequence: AtomicU64,
}

impl ChangeFeed {
    /// Creates a new change feed.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Subscribes to the change feed.
    ///
    /// Returns a receiver that will receive all future changes.
    pub fn subscribe(&self) -> Receiver<LocalChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Registers an observer for all future changes.
    pub fn observe(&self, observer: Arc<dyn ChangeObserver>) {
        self.observers.write().push(observer);
    }

    /// Emits a change, assigning it the next sequence number.
    pub(crate) fn emit(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation: ChangeOperation,
        timestamp: Timestamp,
    ) {
        let change = LocalChange {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            entity_type,
            entity_id: entity_id.to_string(),
            operation,
            timestamp,
        };

        for observer in self.observers.read().iter() {
            observer.on_change(&change);
        }

        // Drop disconnected subscribers.
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    /// Returns the sequence number of the last emitted change.
    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Recorder(Mutex<Vec<LocalChange>>);

    impl ChangeObserver for Recorder {
        fn on_change(&self, change: &LocalChange) {
            self.0.lock().push(change.clone());
        }
    }

    #[test]
    fn emit_and_receive() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();

        feed.emit(EntityType::Note, "n1", ChangeOperation::Create, 10);

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received.sequence, 1);
        assert_eq!(received.entity_id, "n1");
        assert_eq!(received.operation, ChangeOperation::Create);
    }

    #[test]
    fn observers_see_every_change() {
        let feed = ChangeFeed::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        feed.observe(recorder.clone());

        feed.emit(EntityType::Session, "s1", ChangeOperation::Create, 1);
        feed.emit(EntityType::Session, "s1", ChangeOperation::Delete, 2);

        let seen = recorder.0.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].sequence, 2);
        assert_eq!(feed.latest_sequence(), 2);
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.emit(EntityType::Image, "i1", ChangeOperation::Create, 1);
        assert_eq!(feed.subscriber_count(), 0);
    }
}
