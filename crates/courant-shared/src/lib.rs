//! # courant-shared
//!
//! Types shared by every Courant crate: identifier newtypes, the connection
//! status enum, the typed wire protocol spoken over the duplex link, and
//! protocol-wide constants.

pub mod constants;
pub mod protocol;
pub mod types;

pub use protocol::{ClientCommand, ServerEvent};
pub use types::{ChannelId, ConnectionStatus, MessageId, UserId};
