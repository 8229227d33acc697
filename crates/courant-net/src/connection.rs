//! Connection state machine with tokio mpsc command/notification pattern.
//!
//! The connection runs in a dedicated tokio task. External code talks to it
//! through a [`ConnectionHandle`]; inbound server events flow out on a typed
//! notification channel, in wire order.
//!
//! States: `Disconnected → Connecting → Connected → Disconnected`.  Failed
//! attempts stay in `Connecting`, paced by [`ReconnectPolicy`].  An
//! unexpected close while `Connected` drops straight to `Disconnected`; it
//! is the supervisor's decision when to call [`ConnectionHandle::connect`]
//! again.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{info, warn};

use courant_shared::constants::{CONNECTION_COMMAND_CAPACITY, INBOUND_EVENT_CAPACITY};
use courant_shared::protocol::{ClientCommand, ServerEvent};
use courant_shared::types::ConnectionStatus;

use crate::backoff::ReconnectPolicy;
use crate::error::{Result, TransportError};
use crate::link::{Channel, Connector};
use crate::status::StatusFeed;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Commands sent *into* the connection task.
#[derive(Debug)]
enum ConnectionCommand {
    /// Start connecting; idempotent while `Connecting`/`Connected`.
    Connect,
    /// Transmit one frame; the outcome is reported on `reply`.
    Send {
        frame: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Gracefully stop the task.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to the connection task.
#[derive(Clone)]
pub struct ConnectionHandle {
    cmd_tx: mpsc::Sender<ConnectionCommand>,
    status: StatusFeed,
}

impl ConnectionHandle {
    /// Request a connection attempt.  No-op while already
    /// `Connecting`/`Connected`; outcome observed via the status feed.
    pub async fn connect(&self) {
        let _ = self.cmd_tx.send(ConnectionCommand::Connect).await;
    }

    /// Transmit one command over the current connection.
    ///
    /// Fails with [`TransportError::NotConnected`] when the connection is
    /// not established, or [`TransportError::TransmissionFailed`] when the
    /// link rejects the write.  The frame is atomic: it is either fully
    /// accepted by the link or the call fails.
    pub async fn send(&self, command: &ClientCommand) -> Result<()> {
        let bytes = command
            .to_bytes()
            .map_err(|e| TransportError::TransmissionFailed(format!("encode: {e}")))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnectionCommand::Send {
                frame: Bytes::from(bytes),
                reply: reply_tx,
            })
            .await
            .map_err(|_| TransportError::Closed)?;

        reply_rx.await.map_err(|_| TransportError::Closed)?
    }

    /// The status right now.
    pub fn status(&self) -> ConnectionStatus {
        self.status.current()
    }

    /// Subscribe to status transitions (deduplicated, no replay).
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Stop the connection task.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ConnectionCommand::Shutdown).await;
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Spawn the connection task.
///
/// Returns the handle and the inbound event channel.  The task starts in
/// `Disconnected` and does nothing until [`ConnectionHandle::connect`] is
/// called.
pub fn spawn_connection(
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(CONNECTION_COMMAND_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(INBOUND_EVENT_CAPACITY);
    let status = StatusFeed::new();

    let task = ConnectionTask {
        connector,
        policy,
        status: status.clone(),
        cmd_rx,
        event_tx,
    };
    tokio::spawn(task.run());

    (ConnectionHandle { cmd_tx, status }, event_rx)
}

/// Why a phase ended.
enum PhaseEnd {
    /// Shutdown requested or all handles dropped.
    Shutdown,
    /// The established link closed under us.
    LinkLost,
}

struct ConnectionTask {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    status: StatusFeed,
    cmd_rx: mpsc::Receiver<ConnectionCommand>,
    event_tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionTask {
    async fn run(mut self) {
        info!("connection task started");

        'outer: loop {
            // --- Disconnected: wait for a connect request ---
            loop {
                match self.cmd_rx.recv().await {
                    None | Some(ConnectionCommand::Shutdown) => break 'outer,
                    Some(ConnectionCommand::Connect) => break,
                    Some(ConnectionCommand::Send { reply, .. }) => {
                        let _ = reply.send(Err(TransportError::NotConnected));
                    }
                }
            }

            // --- Connecting: attempt with backoff until established ---
            self.status.set(ConnectionStatus::Connecting);
            let channel = match self.connecting().await {
                Some(channel) => channel,
                None => break 'outer,
            };

            self.status.set(ConnectionStatus::Connected);
            info!("connected to server");

            // --- Connected: pump commands and inbound frames ---
            match self.connected(channel.as_ref()).await {
                PhaseEnd::Shutdown => break 'outer,
                PhaseEnd::LinkLost => {
                    warn!("server link lost");
                    self.status.set(ConnectionStatus::Disconnected);
                }
            }
        }

        self.status.set(ConnectionStatus::Disconnected);
        info!("connection task terminated");
    }

    /// Dial until a channel is established, pacing failures with the
    /// backoff policy.  Stays responsive to commands between attempts.
    /// Returns `None` when shutdown was requested instead.
    async fn connecting(&mut self) -> Option<Box<dyn Channel>> {
        let mut failed_attempts: u32 = 0;

        loop {
            let delay = self.policy.delay(failed_attempts);
            let deadline = Instant::now() + delay;

            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    cmd = self.cmd_rx.recv() => match cmd {
                        None | Some(ConnectionCommand::Shutdown) => return None,
                        Some(ConnectionCommand::Connect) => {} // already connecting
                        Some(ConnectionCommand::Send { reply, .. }) => {
                            let _ = reply.send(Err(TransportError::NotConnected));
                        }
                    },
                }
            }

            match self.connector.dial().await {
                Ok(channel) => return Some(channel),
                Err(e) => {
                    failed_attempts += 1;
                    warn!(
                        attempt = failed_attempts,
                        error = %e,
                        "connection attempt failed"
                    );
                }
            }
        }
    }

    /// Pump the established channel until it closes or shutdown is
    /// requested.  Inbound frames are decoded here; frames that do not
    /// parse are logged and dropped so one bad push cannot stall the
    /// pipeline.
    async fn connected(&mut self, channel: &dyn Channel) -> PhaseEnd {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(ConnectionCommand::Shutdown) => return PhaseEnd::Shutdown,
                    Some(ConnectionCommand::Connect) => {} // already connected
                    Some(ConnectionCommand::Send { frame, reply }) => {
                        let result = channel.send(frame).await;
                        if let Err(ref e) = result {
                            warn!(error = %e, "outbound transmission failed");
                        }
                        let _ = reply.send(result);
                    }
                },

                frame = channel.recv() => match frame {
                    Some(bytes) => match ServerEvent::from_bytes(&bytes) {
                        Ok(event) => {
                            if self.event_tx.send(event).await.is_err() {
                                // Event consumer is gone; nothing left to do.
                                return PhaseEnd::Shutdown;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, len = bytes.len(), "dropping malformed inbound frame");
                        }
                    },
                    None => return PhaseEnd::LinkLost,
                },
            }
        }
    }
}
