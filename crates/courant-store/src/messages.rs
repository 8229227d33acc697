//! CRUD helpers for [`ChannelMessage`] rows.
//!
//! Upsert-by-id is the only write path: both server pushes and optimistic
//! local writes land here, and a second write for the same id replaces the
//! whole row (last writer wins).

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use courant_shared::types::{ChannelId, MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ChannelMessage, SyncState};

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Insert the message, or replace the existing row with the same id.
    ///
    /// The replace is a full-row overwrite, not a field merge.
    pub fn upsert_message(&self, message: &ChannelMessage) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages
                 (id, channel_id, sender_id, content, sent_at, reply_to,
                  edited, deleted, attachments, sync_state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                 channel_id  = excluded.channel_id,
                 sender_id   = excluded.sender_id,
                 content     = excluded.content,
                 sent_at     = excluded.sent_at,
                 reply_to    = excluded.reply_to,
                 edited      = excluded.edited,
                 deleted     = excluded.deleted,
                 attachments = excluded.attachments,
                 sync_state  = excluded.sync_state",
            params![
                message.id.to_string(),
                message.channel_id.to_string(),
                message.sender_id.to_string(),
                message.content,
                message.sent_at.to_rfc3339(),
                message.reply_to.map(|r| r.to_string()),
                message.edited,
                message.deleted,
                serde_json::to_string(&message.attachments)?,
                message.sync.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Tombstone a message.  Returns the channel of the affected row, or
    /// `None` if the id is unknown.  Already-tombstoned rows are left as
    /// they are (the operation is idempotent).
    pub fn tombstone_message(&self, id: MessageId) -> Result<Option<ChannelId>> {
        let channel: Option<String> = self
            .conn()
            .query_row(
                "SELECT channel_id FROM messages WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(channel) = channel else {
            return Ok(None);
        };

        self.conn().execute(
            "UPDATE messages SET deleted = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;

        Ok(Some(ChannelId(Uuid::parse_str(&channel)?)))
    }

    /// Physically remove every message of a channel.  Returns the number of
    /// purged rows.  This is the only operation that deletes rows.
    pub fn clear_channel_messages(&self, channel_id: &ChannelId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE channel_id = ?1",
            params![channel_id.to_string()],
        )?;
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single message by id, tombstoned or not.
    pub fn get_message(&self, id: MessageId) -> Result<ChannelMessage> {
        self.conn()
            .query_row(
                "SELECT id, channel_id, sender_id, content, sent_at, reply_to,
                        edited, deleted, attachments, sync_state
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All live (non-tombstoned) messages of a channel, ordered by send
    /// time ascending with the id as a deterministic tiebreak.
    pub fn messages_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<ChannelMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, channel_id, sender_id, content, sent_at, reply_to,
                    edited, deleted, attachments, sync_state
             FROM messages
             WHERE channel_id = ?1 AND deleted = 0
             ORDER BY sent_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![channel_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Number of live messages in a channel.
    pub fn count_for_channel(&self, channel_id: &ChannelId) -> Result<u64> {
        let count: u64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE channel_id = ?1 AND deleted = 0",
            params![channel_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`ChannelMessage`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelMessage> {
    let id_str: String = row.get(0)?;
    let channel_id_str: String = row.get(1)?;
    let sender_id_str: String = row.get(2)?;
    let content: String = row.get(3)?;
    let sent_str: String = row.get(4)?;
    let reply_to_str: Option<String> = row.get(5)?;
    let edited: bool = row.get(6)?;
    let deleted: bool = row.get(7)?;
    let attachments_json: String = row.get(8)?;
    let sync_str: String = row.get(9)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let channel_id = Uuid::parse_str(&channel_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let sender_id = Uuid::parse_str(&sender_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let sent_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&sent_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let reply_to = reply_to_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?
        .map(MessageId);

    let attachments: Vec<String> = serde_json::from_str(&attachments_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let sync = SyncState::parse(&sync_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            rusqlite::types::Type::Text,
            format!("unknown sync state: {sync_str}").into(),
        )
    })?;

    Ok(ChannelMessage {
        id: MessageId(id),
        channel_id: ChannelId(channel_id),
        sender_id: UserId(sender_id),
        content,
        sent_at,
        reply_to,
        edited,
        deleted,
        attachments,
        sync,
    })
}
