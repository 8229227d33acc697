use thiserror::Error;

/// Errors produced by the transport layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A send was attempted while the connection is not `Connected`.
    #[error("Not connected to the server")]
    NotConnected,

    /// The underlying link rejected or lost a write.
    #[error("Transmission failed: {0}")]
    TransmissionFailed(String),

    /// A connection attempt was rejected by the link.
    #[error("Dial failed: {0}")]
    DialFailed(String),

    /// The connection task has shut down.
    #[error("Connection task closed")]
    Closed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TransportError>;
