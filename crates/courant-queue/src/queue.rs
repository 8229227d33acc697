//! The durable FIFO and its drain loop.

use std::path::Path;
use std::sync::Mutex;

use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use courant_net::ConnectionHandle;

use crate::error::{QueueError, Result};
use crate::models::PendingAction;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS pending_actions (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL,
    kind       TEXT NOT NULL,               -- send | edit | delete
    payload    TEXT NOT NULL,               -- JSON-encoded action
    created_at TEXT NOT NULL                -- ISO-8601 / RFC-3339
);
"#;

/// Durable, ordered queue of [`PendingAction`]s.
///
/// `enqueue` never looks at connection state; `drain` transmits strictly in
/// FIFO order, one action in flight, and stops at the first failure leaving
/// the failed action (and everything behind it) untouched.
#[derive(Debug)]
pub struct ActionQueue {
    conn: Mutex<Connection>,
    /// Serializes drain passes; only one action may ever be in flight.
    drain_gate: tokio::sync::Mutex<()>,
}

impl ActionQueue {
    /// Open (or create) the default queue database.
    ///
    /// Lives next to the message cache but in its own file, so the two are
    /// independently persisted.
    pub fn open_default() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "courant", "courant").ok_or(QueueError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("outbox.db");

        info!(path = %db_path.display(), "opening action queue");

        Self::open_at(&db_path)
    }

    /// Open (or create) a queue at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a throwaway in-memory queue.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA_SQL)?;

        let queue = Self {
            conn: Mutex::new(conn),
            drain_gate: tokio::sync::Mutex::new(()),
        };
        queue.verify_persisted()?;
        Ok(queue)
    }

    /// Decode every persisted row once at startup.  A row that no longer
    /// parses means the pending user actions cannot be trusted, which must
    /// surface as a fatal initialization error rather than a silent drop.
    fn verify_persisted(&self) -> Result<()> {
        let conn = self.conn.lock().expect("queue lock poisoned");
        let mut stmt = conn.prepare("SELECT seq, payload FROM pending_actions ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut pending = 0usize;
        for row in rows {
            let (seq, payload) = row?;
            serde_json::from_str::<PendingAction>(&payload)
                .map_err(|e| QueueError::Corruption(format!("row {seq}: {e}")))?;
            pending += 1;
        }

        if pending > 0 {
            info!(pending, "recovered persisted actions");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // FIFO operations
    // ------------------------------------------------------------------

    /// Append an action to the tail.  Returns immediately; never blocks on
    /// network state.
    pub fn enqueue(&self, action: &PendingAction) -> Result<()> {
        let conn = self.conn.lock().expect("queue lock poisoned");
        conn.execute(
            "INSERT INTO pending_actions (message_id, kind, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                action.message_id().to_string(),
                action.kind(),
                serde_json::to_string(action)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        debug!(msg_id = %action.message_id(), kind = action.kind(), "action enqueued");
        Ok(())
    }

    /// The head of the queue, if any.
    fn front(&self) -> Result<Option<(i64, PendingAction)>> {
        let conn = self.conn.lock().expect("queue lock poisoned");
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT seq, payload FROM pending_actions ORDER BY seq ASC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((seq, payload)) => {
                let action = serde_json::from_str(&payload)
                    .map_err(|e| QueueError::Corruption(format!("row {seq}: {e}")))?;
                Ok(Some((seq, action)))
            }
            None => Ok(None),
        }
    }

    fn remove(&self, seq: i64) -> Result<()> {
        let conn = self.conn.lock().expect("queue lock poisoned");
        conn.execute(
            "DELETE FROM pending_actions WHERE seq = ?1",
            params![seq],
        )?;
        Ok(())
    }

    /// Number of queued actions.
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("queue lock poisoned");
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM pending_actions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of the queued actions in FIFO order (for UI badges and
    /// tests).
    pub fn pending_actions(&self) -> Result<Vec<PendingAction>> {
        let conn = self.conn.lock().expect("queue lock poisoned");
        let mut stmt =
            conn.prepare("SELECT seq, payload FROM pending_actions ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut actions = Vec::new();
        for row in rows {
            let (seq, payload) = row?;
            actions.push(
                serde_json::from_str(&payload)
                    .map_err(|e| QueueError::Corruption(format!("row {seq}: {e}")))?,
            );
        }
        Ok(actions)
    }

    // ------------------------------------------------------------------
    // Drain
    // ------------------------------------------------------------------

    /// Transmit queued actions in FIFO order until the queue is empty or a
    /// transmission fails.
    ///
    /// One action is in flight at a time: an edit or delete must never
    /// overtake the `Send` of its own message.  An action is removed only
    /// after the transport accepts the write; on failure it stays at the
    /// head, everything behind it untouched, and the pass ends; the next
    /// `Connected` transition will try again.  Transmission failures never
    /// escape this boundary; only queue storage errors do.
    ///
    /// Returns the number of actions transmitted in this pass.
    pub async fn drain(&self, connection: &ConnectionHandle) -> Result<usize> {
        let _gate = self.drain_gate.lock().await;

        let mut transmitted = 0usize;
        loop {
            let Some((seq, action)) = self.front()? else {
                break;
            };

            match connection.send(&action.to_command()).await {
                Ok(()) => {
                    self.remove(seq)?;
                    transmitted += 1;
                    debug!(
                        msg_id = %action.message_id(),
                        kind = action.kind(),
                        "action transmitted"
                    );
                }
                Err(e) => {
                    warn!(
                        msg_id = %action.message_id(),
                        kind = action.kind(),
                        error = %e,
                        "drain stopped, waiting for connectivity"
                    );
                    break;
                }
            }
        }

        if transmitted > 0 {
            info!(transmitted, "drain pass complete");
        }
        Ok(transmitted)
    }
}
