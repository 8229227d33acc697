use thiserror::Error;

/// Errors produced by the action queue.
#[derive(Error, Debug)]
pub enum QueueError {
    /// SQLite error.
    #[error("Queue database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Action (de)serialization error.
    #[error("Action encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The persisted queue is unreadable.  Surfaced at startup as a fatal
    /// error: silently dropping pending user actions is unacceptable.
    #[error("Persisted queue is corrupt: {0}")]
    Corruption(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueueError>;
