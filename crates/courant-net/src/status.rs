//! Observable connection status.

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use courant_shared::constants::STATUS_FEED_CAPACITY;
use courant_shared::types::ConnectionStatus;

/// Shared, observable [`ConnectionStatus`] value.
///
/// The feed starts at `Disconnected` and emits exactly once per actual
/// transition; setting the current value again is a no-op.  Only the
/// connection task writes to it.
#[derive(Debug, Clone)]
pub struct StatusFeed {
    current: Arc<RwLock<ConnectionStatus>>,
    tx: broadcast::Sender<ConnectionStatus>,
}

impl StatusFeed {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_FEED_CAPACITY);
        Self {
            current: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            tx,
        }
    }

    /// The status right now.
    pub fn current(&self) -> ConnectionStatus {
        *self.current.read().expect("status lock poisoned")
    }

    /// Subscribe to future transitions.  The current value is not replayed;
    /// read it with [`StatusFeed::current`] first.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    /// Record a transition.  Duplicate values are suppressed.
    pub(crate) fn set(&self, next: ConnectionStatus) {
        let mut current = self.current.write().expect("status lock poisoned");
        if *current == next {
            return;
        }
        debug!(from = %*current, to = %next, "connection status changed");
        *current = next;
        // Nobody listening is fine.
        let _ = self.tx.send(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_disconnected() {
        let feed = StatusFeed::new();
        assert_eq!(feed.current(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn duplicate_transitions_are_suppressed() {
        let feed = StatusFeed::new();
        let mut rx = feed.subscribe();

        feed.set(ConnectionStatus::Connecting);
        feed.set(ConnectionStatus::Connecting);
        feed.set(ConnectionStatus::Connected);

        assert_eq!(rx.recv().await.unwrap(), ConnectionStatus::Connecting);
        assert_eq!(rx.recv().await.unwrap(), ConnectionStatus::Connected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn current_tracks_last_set() {
        let feed = StatusFeed::new();
        feed.set(ConnectionStatus::Connecting);
        feed.set(ConnectionStatus::Connected);
        assert_eq!(feed.current(), ConnectionStatus::Connected);
    }
}
