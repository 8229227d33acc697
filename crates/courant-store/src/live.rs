//! Live subscriptions over the message cache.
//!
//! Subscribers are notified after a mutation is committed, never before;
//! re-subscribing restarts the view from the current snapshot.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;

use courant_shared::types::ChannelId;

/// Registry of per-channel change listeners.
///
/// A notification is a bare tick; listeners re-read the ordered snapshot
/// from the store.  Dead listeners are dropped on the next notify.
#[derive(Debug, Default)]
pub struct LiveHub {
    subscribers: RwLock<HashMap<ChannelId, Vec<mpsc::UnboundedSender<()>>>>,
}

impl LiveHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one channel.
    pub fn subscribe(&self, channel_id: &ChannelId) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut subscribers = self.subscribers.write().expect("live hub lock poisoned");
        subscribers.entry(channel_id.clone()).or_default().push(tx);

        rx
    }

    /// Wake every listener of a channel.  Must be called after the mutation
    /// is committed.
    pub fn notify(&self, channel_id: &ChannelId) {
        let mut subscribers = self.subscribers.write().expect("live hub lock poisoned");

        if let Some(senders) = subscribers.get_mut(channel_id) {
            senders.retain(|sender| sender.send(()).is_ok());
            if senders.is_empty() {
                subscribers.remove(channel_id);
            }
        }
    }

    /// Number of registered listeners for a channel.  May include dead
    /// listeners not yet cleaned up by a notify.
    pub fn subscriber_count(&self, channel_id: &ChannelId) -> usize {
        let subscribers = self.subscribers.read().expect("live hub lock poisoned");
        subscribers.get(channel_id).map(|s| s.len()).unwrap_or(0)
    }
}
