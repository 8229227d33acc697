//! In-memory duplex link.
//!
//! [`MemoryLink`] plays the server end of the wire: tests (and non-network
//! embeddings) hand its [`Connector`] to [`spawn_connection`], then inject
//! inbound events, inspect transmitted commands, and script failures such
//! as refused dials, rejected writes, or a dropped connection.
//!
//! [`spawn_connection`]: crate::connection::spawn_connection

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use courant_shared::protocol::{ClientCommand, ServerEvent};

use crate::error::{Result, TransportError};
use crate::link::{Channel, Connector};

struct LinkState {
    refuse_dials: AtomicBool,
    fail_sends: AtomicBool,
    /// Remaining writes to accept before rejecting; negative disables the
    /// countdown.
    fail_after: AtomicI64,
    /// Frames the client transmitted, across all sessions.
    sent: Mutex<Vec<Bytes>>,
    /// Push side of the currently attached session, if any.
    session: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            refuse_dials: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            fail_after: AtomicI64::new(-1),
            sent: Mutex::new(Vec::new()),
            session: Mutex::new(None),
        }
    }
}

/// The server end of an in-process duplex link.
#[derive(Clone, Default)]
pub struct MemoryLink {
    state: Arc<LinkState>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The [`Connector`] to hand to the connection task.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            state: self.state.clone(),
        }
    }

    /// Refuse (or stop refusing) new dial attempts.
    pub fn refuse_dials(&self, refuse: bool) {
        self.state.refuse_dials.store(refuse, Ordering::SeqCst);
    }

    /// Reject (or stop rejecting) outbound writes on the attached session.
    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
        if !fail {
            self.state.fail_after.store(-1, Ordering::SeqCst);
        }
    }

    /// Accept the next `n` writes, then reject subsequent ones until
    /// [`MemoryLink::fail_sends`] is called with `false`.
    pub fn fail_sends_after(&self, n: usize) {
        self.state.fail_after.store(n as i64, Ordering::SeqCst);
    }

    /// Whether a session is currently attached.
    pub fn is_attached(&self) -> bool {
        self.state.session.lock().expect("link lock poisoned").is_some()
    }

    /// Push a server event to the client.  Silently dropped when no session
    /// is attached, like a real server writing into a closed socket.
    pub fn push_event(&self, event: &ServerEvent) {
        let frame = Bytes::from(event.to_bytes().expect("event serializes"));
        self.push_frame(frame);
    }

    /// Push a raw frame, bypassing serialization.
    pub fn push_frame(&self, frame: Bytes) {
        let session = self.state.session.lock().expect("link lock poisoned");
        if let Some(tx) = session.as_ref() {
            let _ = tx.send(frame);
        }
    }

    /// Sever the attached session; the client observes a closed link.
    pub fn drop_connection(&self) {
        self.state
            .session
            .lock()
            .expect("link lock poisoned")
            .take();
    }

    /// All frames transmitted by the client so far.
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.state.sent.lock().expect("link lock poisoned").clone()
    }

    /// Transmitted frames decoded as [`ClientCommand`]s.
    pub fn sent_commands(&self) -> Vec<ClientCommand> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| ClientCommand::from_bytes(frame).ok())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.sent.lock().expect("link lock poisoned").clear();
    }
}

/// Client-side dialer for a [`MemoryLink`].
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<LinkState>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn dial(&self) -> Result<Box<dyn Channel>> {
        if self.state.refuse_dials.load(Ordering::SeqCst) {
            return Err(TransportError::DialFailed("dial refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.session.lock().expect("link lock poisoned") = Some(tx);

        Ok(Box::new(MemoryChannel {
            state: self.state.clone(),
            rx: tokio::sync::Mutex::new(rx),
        }))
    }
}

struct MemoryChannel {
    state: Arc<LinkState>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&self, frame: Bytes) -> Result<()> {
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::TransmissionFailed(
                "write rejected".to_string(),
            ));
        }
        match self.state.fail_after.load(Ordering::SeqCst) {
            0 => {
                return Err(TransportError::TransmissionFailed(
                    "write rejected".to_string(),
                ));
            }
            n if n > 0 => {
                self.state.fail_after.fetch_sub(1, Ordering::SeqCst);
            }
            _ => {}
        }
        if self.state.session.lock().expect("link lock poisoned").is_none() {
            return Err(TransportError::TransmissionFailed(
                "link closed".to_string(),
            ));
        }
        self.state.sent.lock().expect("link lock poisoned").push(frame);
        Ok(())
    }

    async fn recv(&self) -> Option<Bytes> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courant_shared::types::MessageId;

    #[tokio::test]
    async fn dial_and_push_round_trip() {
        let link = MemoryLink::new();
        let channel = link.connector().dial().await.unwrap();
        assert!(link.is_attached());

        let event = ServerEvent::Ack {
            message_id: MessageId::new(),
        };
        link.push_event(&event);

        let frame = channel.recv().await.unwrap();
        assert_eq!(ServerEvent::from_bytes(&frame).unwrap(), event);
    }

    #[tokio::test]
    async fn refused_dial_fails() {
        let link = MemoryLink::new();
        link.refuse_dials(true);
        assert!(link.connector().dial().await.is_err());
    }

    #[tokio::test]
    async fn dropped_connection_closes_recv() {
        let link = MemoryLink::new();
        let channel = link.connector().dial().await.unwrap();
        link.drop_connection();
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test]
    async fn injected_send_failure() {
        let link = MemoryLink::new();
        let channel = link.connector().dial().await.unwrap();
        link.fail_sends(true);
        assert!(channel.send(Bytes::from_static(b"x")).await.is_err());
        assert!(link.sent_frames().is_empty());
    }
}
