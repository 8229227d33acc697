//! Domain model structs persisted in the local message database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courant_shared::types::{ChannelId, MessageId, UserId};

// ---------------------------------------------------------------------------
// SyncState
// ---------------------------------------------------------------------------

/// Where a cached row stands relative to the server log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncState {
    /// Written locally, not yet seen back from the server.
    Optimistic,
    /// The server's version matches what we wrote.
    Confirmed,
    /// The server pushed a different version than our local write
    /// (e.g. a concurrent edit by another participant won).
    Reconciled,
}

impl SyncState {
    /// Column representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimistic => "optimistic",
            Self::Confirmed => "confirmed",
            Self::Reconciled => "reconciled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "optimistic" => Some(Self::Optimistic),
            "confirmed" => Some(Self::Confirmed),
            "reconciled" => Some(Self::Reconciled),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelMessage
// ---------------------------------------------------------------------------

/// A single chat message in the local cache.
///
/// `id` is globally unique and is the only upsert key; the store never holds
/// two rows with the same id.  Deletion is a tombstone (`deleted = true`),
/// never a physical removal, so channel ordering stays continuous.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Unique message identifier, minted by the sender at creation time.
    pub id: MessageId,
    /// The channel this message belongs to.
    pub channel_id: ChannelId,
    /// Who sent it.
    pub sender_id: UserId,
    /// Message text.  Non-empty for live messages.
    pub content: String,
    /// When the sender created the message.
    pub sent_at: DateTime<Utc>,
    /// The message this one replies to, if any.
    pub reply_to: Option<MessageId>,
    /// Whether the content was edited after creation.
    pub edited: bool,
    /// Tombstone flag.
    pub deleted: bool,
    /// Ordered attachment URLs, possibly empty.
    pub attachments: Vec<String>,
    /// Reconciliation status against the server log.
    pub sync: SyncState,
}
