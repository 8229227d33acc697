use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, MessageId, UserId};

/// Outbound commands sent to the server over the duplex link.
///
/// Every command carries the client-minted `message_id`, so the server can
/// deduplicate retransmissions after a reconnect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientCommand {
    /// Publish a new message into a channel.
    SendMessage {
        message_id: MessageId,
        channel_id: ChannelId,
        sender_id: UserId,
        content: String,
        reply_to: Option<MessageId>,
    },

    /// Replace the content of an existing message.
    EditMessage {
        message_id: MessageId,
        channel_id: ChannelId,
        new_content: String,
    },

    /// Tombstone an existing message.
    DeleteMessage {
        message_id: MessageId,
        channel_id: ChannelId,
    },
}

impl ClientCommand {
    /// The message this command operates on.
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::SendMessage { message_id, .. }
            | Self::EditMessage { message_id, .. }
            | Self::DeleteMessage { message_id, .. } => *message_id,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        match self {
            Self::SendMessage { channel_id, .. }
            | Self::EditMessage { channel_id, .. }
            | Self::DeleteMessage { channel_id, .. } => channel_id,
        }
    }

    /// Serialize to binary (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// Inbound events pushed by the server, delivered in wire order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServerEvent {
    /// A message was published (by us or by another participant).
    MessageCreated {
        message_id: MessageId,
        channel_id: ChannelId,
        sender_id: UserId,
        content: String,
        reply_to: Option<MessageId>,
        sent_at: DateTime<Utc>,
        attachments: Vec<String>,
    },

    /// A message's content was replaced.
    MessageEdited {
        message_id: MessageId,
        channel_id: ChannelId,
        new_content: String,
    },

    /// A message was tombstoned.
    MessageDeleted {
        message_id: MessageId,
        channel_id: ChannelId,
    },

    /// The server confirms it has durably accepted the command for
    /// `message_id`.
    Ack { message_id: MessageId },
}

impl ServerEvent {
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::MessageCreated { message_id, .. }
            | Self::MessageEdited { message_id, .. }
            | Self::MessageDeleted { message_id, .. }
            | Self::Ack { message_id } => *message_id,
        }
    }

    /// Serialize to binary (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_command_roundtrip() {
        let cmd = ClientCommand::SendMessage {
            message_id: MessageId::new(),
            channel_id: ChannelId::new(),
            sender_id: UserId::new(),
            content: "bonjour".to_string(),
            reply_to: None,
        };

        let bytes = cmd.to_bytes().unwrap();
        let restored = ClientCommand::from_bytes(&bytes).unwrap();
        assert_eq!(cmd, restored);
    }

    #[test]
    fn test_server_event_roundtrip() {
        let event = ServerEvent::MessageEdited {
            message_id: MessageId::new(),
            channel_id: ChannelId::new(),
            new_content: "edited".to_string(),
        };

        let bytes = event.to_bytes().unwrap();
        let restored = ServerEvent::from_bytes(&bytes).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn test_malformed_event_rejected() {
        assert!(ServerEvent::from_bytes(&[0xFF; 3]).is_err());
    }
}
