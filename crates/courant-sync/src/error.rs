use thiserror::Error;

use courant_queue::QueueError;
use courant_store::StoreError;

/// Errors surfaced by the session API.
///
/// Network failures never appear here: sends, edits and deletes only touch
/// durable local state, and all transmission retries happen inside the
/// queue's drain loop.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Message cache failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Action queue failure.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Messages must carry non-empty text.
    #[error("Message content is empty")]
    EmptyContent,

    /// Message content exceeds the protocol limit.
    #[error("Message content exceeds {0} bytes")]
    ContentTooLarge(usize),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
