//! The session-scoped coordinator.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::info;

use courant_net::ConnectionHandle;
use courant_queue::{ActionQueue, PendingAction};
use courant_shared::constants::MAX_MESSAGE_SIZE;
use courant_shared::protocol::ServerEvent;
use courant_shared::types::{ChannelId, ConnectionStatus, MessageId, UserId};
use courant_store::{ChannelMessage, MessageStore, MessageStream, StoreError, SyncState};

use crate::bridge;
use crate::error::{Result, SyncError};

/// One user's chat session.
///
/// Owns the long-lived singletons (message cache, action queue, connection
/// handle) and exposes the operations the UI calls.  All operations are
/// fire-and-forget from the caller's perspective: they only touch durable
/// local state and cannot fail on network conditions.
pub struct ChatSession {
    user_id: UserId,
    store: Arc<MessageStore>,
    queue: Arc<ActionQueue>,
    connection: ConnectionHandle,
    drain_nudge: mpsc::Sender<()>,
}

impl ChatSession {
    /// Wire up a session and spawn its background loops.
    ///
    /// `events` is the inbound channel returned by
    /// [`courant_net::spawn_connection`]; the session takes over consuming
    /// it.  Call [`ChatSession::connect`] to go online; everything works
    /// offline until then.
    pub fn start(
        user_id: UserId,
        store: Arc<MessageStore>,
        queue: Arc<ActionQueue>,
        connection: ConnectionHandle,
        events: mpsc::Receiver<ServerEvent>,
    ) -> Arc<Self> {
        let (drain_nudge, nudges) = mpsc::channel(1);

        tokio::spawn(bridge::inbound_loop(Arc::clone(&store), events));
        tokio::spawn(bridge::drain_loop(
            Arc::clone(&queue),
            connection.clone(),
            nudges,
        ));

        info!(user = %user_id, "chat session started");

        Arc::new(Self {
            user_id,
            store,
            queue,
            connection,
            drain_nudge,
        })
    }

    // ------------------------------------------------------------------
    // Outbound operations
    // ------------------------------------------------------------------

    /// Send a message: optimistic cache write, then enqueue.
    ///
    /// The message is visible in [`ChatSession::stream_for`] before any
    /// network round-trip and resolves silently once connectivity returns.
    pub fn send_message(
        &self,
        channel_id: &ChannelId,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        validate_content(content)?;

        let message = ChannelMessage {
            id: MessageId::new(),
            channel_id: channel_id.clone(),
            sender_id: self.user_id.clone(),
            content: content.to_string(),
            sent_at: chrono::Utc::now(),
            reply_to,
            edited: false,
            deleted: false,
            attachments: Vec::new(),
            sync: SyncState::Optimistic,
        };

        self.store.upsert(&message)?;
        self.queue.enqueue(&PendingAction::Send {
            message_id: message.id,
            channel_id: channel_id.clone(),
            sender_id: self.user_id.clone(),
            content: message.content.clone(),
            reply_to,
        })?;
        self.nudge_drain();

        info!(msg_id = %message.id, channel = %channel_id, "message queued");
        Ok(message.id)
    }

    /// Edit an existing message, optimistically.
    pub fn edit_message(&self, id: MessageId, new_content: &str) -> Result<()> {
        validate_content(new_content)?;

        let mut message = self.store.get(id)?;
        message.content = new_content.to_string();
        message.edited = true;
        message.sync = SyncState::Optimistic;

        self.store.upsert(&message)?;
        self.queue.enqueue(&PendingAction::Edit {
            message_id: id,
            channel_id: message.channel_id.clone(),
            new_content: new_content.to_string(),
        })?;
        self.nudge_drain();

        info!(msg_id = %id, "edit queued");
        Ok(())
    }

    /// Tombstone an existing message, optimistically.
    pub fn delete_message(&self, id: MessageId) -> Result<()> {
        let mut message = self.store.get(id)?;
        message.deleted = true;
        message.sync = SyncState::Optimistic;

        self.store.upsert(&message)?;
        self.queue.enqueue(&PendingAction::Delete {
            message_id: id,
            channel_id: message.channel_id.clone(),
        })?;
        self.nudge_drain();

        info!(msg_id = %id, "delete queued");
        Ok(())
    }

    /// Purge the local cache of a channel, e.g. when leaving it.
    pub fn leave_channel(&self, channel_id: &ChannelId) -> Result<usize> {
        Ok(self.store.clear_channel(channel_id)?)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Live, ordered message view for a channel.
    pub fn stream_for(&self, channel_id: &ChannelId) -> MessageStream {
        Arc::clone(&self.store).stream_for(channel_id)
    }

    /// Ordered snapshot of a channel.
    pub fn messages_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<ChannelMessage>> {
        Ok(self.store.messages_for_channel(channel_id)?)
    }

    /// One message by id (`NotFound` if the id is unknown).
    pub fn message(&self, id: MessageId) -> std::result::Result<ChannelMessage, StoreError> {
        self.store.get(id)
    }

    /// Number of actions still waiting for transmission.
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.queue.len()?)
    }

    /// Connection status right now (for online/offline indicators).
    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Status transition feed (deduplicated).
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.connection.subscribe_status()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Go online.  Idempotent; progress is observable on the status feed.
    pub async fn connect(&self) {
        self.connection.connect().await;
    }

    /// Stop the connection task.  Queued actions stay persisted and resume
    /// on the next session.
    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
    }

    fn nudge_drain(&self) {
        // A full nudge slot already guarantees a pass is coming.
        let _ = self.drain_nudge.try_send(());
    }
}

fn validate_content(content: &str) -> Result<()> {
    if content.is_empty() {
        return Err(SyncError::EmptyContent);
    }
    if content.len() > MAX_MESSAGE_SIZE {
        return Err(SyncError::ContentTooLarge(MAX_MESSAGE_SIZE));
    }
    Ok(())
}
