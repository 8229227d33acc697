//! v001 -- Initial schema creation.
//!
//! Creates the `messages` table and its channel/time index.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID v4, globally unique
    channel_id  TEXT NOT NULL,               -- UUID v4
    sender_id   TEXT NOT NULL,               -- UUID v4
    content     TEXT NOT NULL,
    sent_at     TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    reply_to    TEXT,                        -- nullable message UUID
    edited      INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    deleted     INTEGER NOT NULL DEFAULT 0,  -- tombstone flag 0/1
    attachments TEXT NOT NULL DEFAULT '[]',  -- JSON array of URLs
    sync_state  TEXT NOT NULL                -- optimistic | confirmed | reconciled
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_sent
    ON messages(channel_id, sent_at ASC, id ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
