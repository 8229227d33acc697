//! Queued outbound operations.

use serde::{Deserialize, Serialize};

use courant_shared::protocol::ClientCommand;
use courant_shared::types::{ChannelId, MessageId, UserId};

/// An outbound operation not yet accepted by the transport.
///
/// Owned by the queue from enqueue until a successful transmission.  All
/// three kinds are idempotent on the receiving side, keyed by `message_id`,
/// so retransmitting after a reconnect is safe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PendingAction {
    Send {
        message_id: MessageId,
        channel_id: ChannelId,
        sender_id: UserId,
        content: String,
        reply_to: Option<MessageId>,
    },
    Edit {
        message_id: MessageId,
        channel_id: ChannelId,
        new_content: String,
    },
    Delete {
        message_id: MessageId,
        channel_id: ChannelId,
    },
}

impl PendingAction {
    /// The message this action operates on.
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::Send { message_id, .. }
            | Self::Edit { message_id, .. }
            | Self::Delete { message_id, .. } => *message_id,
        }
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::Edit { .. } => "edit",
            Self::Delete { .. } => "delete",
        }
    }

    /// The wire command this action transmits as.
    pub fn to_command(&self) -> ClientCommand {
        match self {
            Self::Send {
                message_id,
                channel_id,
                sender_id,
                content,
                reply_to,
            } => ClientCommand::SendMessage {
                message_id: *message_id,
                channel_id: channel_id.clone(),
                sender_id: sender_id.clone(),
                content: content.clone(),
                reply_to: *reply_to,
            },
            Self::Edit {
                message_id,
                channel_id,
                new_content,
            } => ClientCommand::EditMessage {
                message_id: *message_id,
                channel_id: channel_id.clone(),
                new_content: new_content.clone(),
            },
            Self::Delete {
                message_id,
                channel_id,
            } => ClientCommand::DeleteMessage {
                message_id: *message_id,
                channel_id: channel_id.clone(),
            },
        }
    }
}
