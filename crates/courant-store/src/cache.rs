//! Thread-safe message cache facade.
//!
//! [`MessageStore`] serializes all row mutations behind one lock and wakes
//! live subscribers after each committed change, so callers on any thread
//! (UI posting edits, background task applying server pushes) can share it
//! without external locking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use courant_shared::types::{ChannelId, MessageId};

use crate::database::Database;
use crate::error::Result;
use crate::live::LiveHub;
use crate::models::ChannelMessage;

/// Durable, indexed store of messages per channel.
///
/// Upsert by id is the only mutation path; deletion is a tombstone; the only
/// physical purge is [`MessageStore::clear_channel`].
pub struct MessageStore {
    db: Mutex<Database>,
    live: LiveHub,
}

impl MessageStore {
    /// Open the store in the default platform data directory.
    pub fn open_default() -> Result<Self> {
        Ok(Self::from_database(Database::open_default()?))
    }

    /// Open the store at an explicit path (tests, custom layouts).
    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::open_at(path)?))
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            live: LiveHub::new(),
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Insert or fully replace the row with this message's id.
    pub fn upsert(&self, message: &ChannelMessage) -> Result<()> {
        {
            let db = self.db.lock().expect("store lock poisoned");
            db.upsert_message(message)?;
        }
        debug!(msg_id = %message.id, channel = %message.channel_id, "message upserted");
        self.live.notify(&message.channel_id);
        Ok(())
    }

    /// Tombstone a message.  Unknown ids are a no-op (`false`); repeating
    /// the call for an already-tombstoned row is harmless.
    pub fn tombstone(&self, id: MessageId) -> Result<bool> {
        let channel = {
            let db = self.db.lock().expect("store lock poisoned");
            db.tombstone_message(id)?
        };

        match channel {
            Some(channel_id) => {
                debug!(msg_id = %id, channel = %channel_id, "message tombstoned");
                self.live.notify(&channel_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Physically purge every message of a channel (e.g. on leaving it).
    pub fn clear_channel(&self, channel_id: &ChannelId) -> Result<usize> {
        let purged = {
            let db = self.db.lock().expect("store lock poisoned");
            db.clear_channel_messages(channel_id)?
        };
        debug!(channel = %channel_id, purged, "channel cleared");
        self.live.notify(channel_id);
        Ok(purged)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Fetch one message by id, tombstoned or not.  `StoreError::NotFound`
    /// when the id is unknown.
    pub fn get(&self, id: MessageId) -> Result<ChannelMessage> {
        let db = self.db.lock().expect("store lock poisoned");
        db.get_message(id)
    }

    /// Ordered snapshot of a channel's live messages.
    pub fn messages_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<ChannelMessage>> {
        let db = self.db.lock().expect("store lock poisoned");
        db.messages_for_channel(channel_id)
    }

    /// Number of live messages in a channel.
    pub fn count_for_channel(&self, channel_id: &ChannelId) -> Result<u64> {
        let db = self.db.lock().expect("store lock poisoned");
        db.count_for_channel(channel_id)
    }

    /// Live, ordered view of a channel.
    ///
    /// The stream yields the current snapshot first, then a fresh snapshot
    /// after every committed mutation of the channel.  Dropping the stream
    /// unsubscribes; re-subscribing restarts from the current snapshot.
    pub fn stream_for(self: Arc<Self>, channel_id: &ChannelId) -> MessageStream {
        let ticks = self.live.subscribe(channel_id);
        MessageStream {
            store: self,
            channel_id: channel_id.clone(),
            ticks,
            primed: false,
        }
    }
}

// ---------------------------------------------------------------------------
// MessageStream
// ---------------------------------------------------------------------------

/// Continuously updating ordered view of one channel.
pub struct MessageStream {
    store: Arc<MessageStore>,
    channel_id: ChannelId,
    ticks: mpsc::UnboundedReceiver<()>,
    primed: bool,
}

impl MessageStream {
    /// The next snapshot: the current one on first call, then one per
    /// mutation.  `Ok(None)` once the store side of the feed is gone.
    pub async fn next(&mut self) -> Result<Option<Vec<ChannelMessage>>> {
        if !self.primed {
            self.primed = true;
            return self.snapshot().map(Some);
        }

        match self.ticks.recv().await {
            Some(()) => self.snapshot().map(Some),
            None => Ok(None),
        }
    }

    /// Adapt into a [`futures::Stream`] of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<ChannelMessage>>> {
        futures::stream::unfold(self, |mut view| async move {
            match view.next().await {
                Ok(Some(snapshot)) => Some((Ok(snapshot), view)),
                Ok(None) => None,
                Err(e) => Some((Err(e), view)),
            }
        })
    }

    fn snapshot(&self) -> Result<Vec<ChannelMessage>> {
        self.store.messages_for_channel(&self.channel_id)
    }
}
