//! The seam between the connection state machine and the framed duplex link.
//!
//! Courant does not define the wire transport itself; the embedding
//! application supplies a [`Connector`] for whatever link it uses (WebSocket,
//! QUIC stream, unix socket).  Frames are opaque [`Bytes`]; the connection
//! task serializes commands and decodes events on either side of this seam.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Dials the server and yields a fresh [`Channel`] per attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Attempt to establish one duplex channel to the server.
    async fn dial(&self) -> Result<Box<dyn Channel>>;
}

/// One established duplex channel.
///
/// `send` must be atomic from the caller's perspective: a frame is either
/// fully accepted or the call fails.  `recv` is consumed by a single reader
/// (the connection task) and returns `None` once the peer closes the link.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Transmit one frame.
    async fn send(&self, frame: Bytes) -> Result<()>;

    /// Receive the next frame in wire order, or `None` when the link closed.
    async fn recv(&self) -> Option<Bytes>;
}
