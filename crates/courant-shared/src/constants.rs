/// Application name
pub const APP_NAME: &str = "Courant";

/// Maximum message content size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Capacity of the command channel into the connection task
pub const CONNECTION_COMMAND_CAPACITY: usize = 256;

/// Capacity of the inbound event channel out of the connection task
pub const INBOUND_EVENT_CAPACITY: usize = 256;

/// Capacity of the connection status broadcast feed
pub const STATUS_FEED_CAPACITY: usize = 32;

/// Default initial reconnect delay in milliseconds
pub const RECONNECT_INITIAL_DELAY_MS: u64 = 500;

/// Default reconnect delay multiplier
pub const RECONNECT_MULTIPLIER: f64 = 2.0;

/// Default reconnect delay cap in milliseconds (30 s)
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;
