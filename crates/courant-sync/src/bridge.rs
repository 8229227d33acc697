//! Background loops bridging the connection to the local state.
//!
//! Two independent tasks run per session: the inbound loop applies server
//! pushes to the cache in wire order, and the drain supervisor replays the
//! action queue on every `Connected` transition (plus an eager pass when an
//! action is enqueued while already connected).  The two touch disjoint
//! concerns (inbound never enqueues) and the cache serializes row access
//! underneath both.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use courant_net::ConnectionHandle;
use courant_queue::ActionQueue;
use courant_shared::protocol::ServerEvent;
use courant_shared::types::ConnectionStatus;
use courant_store::{ChannelMessage, MessageStore, StoreError, SyncState};

// ---------------------------------------------------------------------------
// Inbound application
// ---------------------------------------------------------------------------

/// Apply server pushes to the cache until the connection task goes away.
pub(crate) async fn inbound_loop(
    store: Arc<MessageStore>,
    mut events: mpsc::Receiver<ServerEvent>,
) {
    info!("inbound bridge started");

    while let Some(event) = events.recv().await {
        if let Err(e) = apply_server_event(&store, event) {
            // Storage trouble on one event must not stall the pipeline.
            warn!(error = %e, "failed to apply server event");
        }
    }

    info!("inbound bridge ended");
}

/// Apply one server event.  Server state always overwrites a still-pending
/// optimistic write for the same message id.
pub(crate) fn apply_server_event(
    store: &MessageStore,
    event: ServerEvent,
) -> Result<(), StoreError> {
    match event {
        ServerEvent::MessageCreated {
            message_id,
            channel_id,
            sender_id,
            content,
            reply_to,
            sent_at,
            attachments,
        } => {
            let mut incoming = ChannelMessage {
                id: message_id,
                channel_id,
                sender_id,
                content,
                sent_at,
                reply_to,
                edited: false,
                deleted: false,
                attachments,
                sync: SyncState::Confirmed,
            };

            // An echo of our own pending send confirms it; any divergence
            // means another writer won and we reconcile to the server.
            match store.get(message_id) {
                Ok(existing) if existing.sync == SyncState::Optimistic => {
                    if existing.content != incoming.content || existing.deleted {
                        incoming.sync = SyncState::Reconciled;
                    }
                }
                Ok(_) | Err(StoreError::NotFound) => {}
                Err(e) => return Err(e),
            }

            debug!(msg_id = %message_id, sync = ?incoming.sync, "applying message push");
            store.upsert(&incoming)
        }

        ServerEvent::MessageEdited {
            message_id,
            new_content,
            ..
        } => {
            let mut row = match store.get(message_id) {
                Ok(row) => row,
                Err(StoreError::NotFound) => {
                    // A partial event cannot reconstruct a full row.
                    warn!(msg_id = %message_id, "edit push for unknown message, dropping");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            row.sync = if row.sync == SyncState::Optimistic && row.content != new_content {
                SyncState::Reconciled
            } else {
                SyncState::Confirmed
            };
            row.content = new_content;
            row.edited = true;

            debug!(msg_id = %message_id, "applying edit push");
            store.upsert(&row)
        }

        ServerEvent::MessageDeleted { message_id, .. } => {
            debug!(msg_id = %message_id, "applying delete push");
            if !store.tombstone(message_id)? {
                warn!(msg_id = %message_id, "delete push for unknown message, dropping");
            }
            Ok(())
        }

        ServerEvent::Ack { message_id } => {
            match store.get(message_id) {
                Ok(row) if row.sync == SyncState::Optimistic => {
                    let mut row = row;
                    row.sync = SyncState::Confirmed;
                    debug!(msg_id = %message_id, "ack confirmed pending write");
                    store.upsert(&row)
                }
                Ok(_) => Ok(()),
                Err(StoreError::NotFound) => {
                    debug!(msg_id = %message_id, "ack for unknown message, ignoring");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Drain supervision
// ---------------------------------------------------------------------------

/// Drive the queue against the connection.
///
/// Every transition to `Connected` triggers a drain pass; a nudge from the
/// session does the same when an action is enqueued while already
/// connected.  On `Disconnected` the supervisor re-requests a connection;
/// retry pacing lives in the transport's backoff, not here.
pub(crate) async fn drain_loop(
    queue: Arc<ActionQueue>,
    connection: ConnectionHandle,
    mut nudges: mpsc::Receiver<()>,
) {
    let mut status_rx = connection.subscribe_status();
    info!("drain supervisor started");

    // Actions persisted before this session may already be waiting.
    if connection.status() == ConnectionStatus::Connected {
        drain_once(&queue, &connection).await;
    }

    loop {
        tokio::select! {
            status = status_rx.recv() => match status {
                Ok(ConnectionStatus::Connected) => drain_once(&queue, &connection).await,
                Ok(ConnectionStatus::Disconnected) => {
                    debug!("connection lost, requesting reconnect");
                    connection.connect().await;
                }
                Ok(ConnectionStatus::Connecting) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "status feed lagged, resynchronizing");
                    if connection.status() == ConnectionStatus::Connected {
                        drain_once(&queue, &connection).await;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            nudge = nudges.recv() => match nudge {
                Some(()) => {
                    if connection.status() == ConnectionStatus::Connected {
                        drain_once(&queue, &connection).await;
                    }
                }
                None => break,
            },
        }
    }

    info!("drain supervisor ended");
}

async fn drain_once(queue: &ActionQueue, connection: &ConnectionHandle) {
    // Transmission failures are already absorbed by the drain pass; only
    // queue storage trouble surfaces here, and all we can do is log it.
    if let Err(e) = queue.drain(connection).await {
        warn!(error = %e, "drain pass failed");
    }
}
