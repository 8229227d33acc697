//! # courant-store
//!
//! Local message cache for the Courant client, backed by SQLite.
//!
//! The crate exposes a thread-safe [`MessageStore`] that serializes row
//! mutations internally and re-emits live, ordered per-channel views after
//! every committed change.  Messages are upserted by id (full-row replace,
//! last writer wins) and deleted as tombstones; the only physical purge is a
//! channel-wide clear.

pub mod cache;
pub mod database;
pub mod live;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use cache::{MessageStore, MessageStream};
pub use database::Database;
pub use error::StoreError;
pub use models::{ChannelMessage, SyncState};
