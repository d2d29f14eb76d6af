//! Sync triggers.
//!
//! Anything that wants a cycle to run sends a [`SyncTrigger`] through a
//! [`TriggerBus`]. The engine's run loop owns the matching
//! [`TriggerReceiver`] and decides when to actually run.
//!
//! A bus registered as a [`ChangeObserver`] on the store turns every tracked
//! local mutation into a [`SyncTrigger::LocalMutation`].

use notesync_core::{ChangeObserver, LocalChange};
use std::fmt;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Reason for a sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTrigger {
    /// The application (or the store) was mounted.
    Mount,
    /// Connectivity was regained.
    Online,
    /// A tracked local mutation happened. Debounced.
    LocalMutation,
    /// The user asked for a sync.
    Manual,
}

impl SyncTrigger {
    /// Returns true for triggers that run immediately.
    pub fn is_immediate(&self) -> bool {
        !matches!(self, SyncTrigger::LocalMutation)
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncTrigger::Mount => "mount",
            SyncTrigger::Online => "online",
            SyncTrigger::LocalMutation => "local-mutation",
            SyncTrigger::Manual => "manual",
        })
    }
}

#[derive(Debug)]
pub(crate) enum Message {
    Trigger(SyncTrigger, Instant),
    Shutdown,
}

/// Sending half of the trigger channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TriggerBus {
    tx: mpsc::UnboundedSender<Message>,
}

/// Receiving half of the trigger channel, consumed by the run loop.
#[derive(Debug)]
pub struct TriggerReceiver {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl TriggerBus {
    /// Creates a connected bus and receiver.
    pub fn channel() -> (TriggerBus, TriggerReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TriggerBus { tx }, TriggerReceiver { rx })
    }

    /// Requests a sync. Returns false if the run loop is gone.
    pub fn send(&self, trigger: SyncTrigger) -> bool {
        self.tx.send(Message::Trigger(trigger, Instant::now())).is_ok()
    }

    /// Asks the run loop to exit after the current cycle.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }

    /// Returns true if the run loop dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl ChangeObserver for TriggerBus {
    fn on_change(&self, _change: &LocalChange) {
        self.send(SyncTrigger::LocalMutation);
    }
}

impl TriggerReceiver {
    /// `None` once every bus is dropped.
    pub(crate) async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::LocalStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn store_mutations_become_triggers() {
        let store = LocalStore::open_in_memory().unwrap();
        let (bus, mut rx) = TriggerBus::channel();
        store.changes().observe(Arc::new(bus.clone()));

        let session = store.create_session("s").unwrap();
        store.create_note(&session.id, "n").unwrap();
        bus.send(SyncTrigger::Manual);
        bus.shutdown();

        let mut seen = Vec::new();
        while let Some(message) = rx.recv().await {
            match message {
                Message::Trigger(trigger, _) => seen.push(trigger),
                Message::Shutdown => break,
            }
        }
        assert_eq!(
            seen,
            vec![
                SyncTrigger::LocalMutation,
                SyncTrigger::LocalMutation,
                SyncTrigger::Manual
            ]
        );
    }

    #[test]
    fn only_local_mutations_are_debounced() {
        assert!(!SyncTrigger::LocalMutation.is_immediate());
        assert!(SyncTrigger::Online.is_immediate());
        assert_eq!(SyncTrigger::LocalMutation.to_string(), "local-mutation");
    }

    #[tokio::test]
    async fn send_reports_a_closed_loop() {
        let (bus, rx) = TriggerBus::channel();
        drop(rx);
        assert!(bus.is_closed());
        assert!(!bus.send(SyncTrigger::Manual));
    }
}
