//! # courant-sync
//!
//! The synchronization coordinator: one [`ChatSession`] per authenticated
//! session owns the message cache, the action queue, and the connection
//! handle, and keeps them eventually consistent.
//!
//! User operations are optimistic: the local write lands in the cache first
//! (the UI updates before any network round-trip), a matching action is
//! enqueued, and the drain supervisor replays it once the connection
//! reports `Connected`.  Server pushes are applied to the cache in wire
//! order and always win over a still-pending optimistic write for the same
//! message id.

pub mod session;

mod bridge;
mod error;

pub use error::SyncError;
pub use session::ChatSession;
