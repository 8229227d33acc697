// Transport layer: the single duplex connection to the server.

pub mod backoff;
pub mod connection;
pub mod error;
pub mod link;
pub mod memory;
pub mod status;

pub use backoff::ReconnectPolicy;
pub use connection::{spawn_connection, ConnectionHandle};
pub use error::TransportError;
pub use link::{Channel, Connector};
pub use memory::MemoryLink;
pub use status::StatusFeed;

pub use courant_shared::types::ConnectionStatus;
