//! SQLite database for chat sessions and their messages.
//!
//! Uses `rusqlite` in synchronous mode; callers on the async side hold it
//! behind a mutex for the duration of one statement batch. WAL mode lets the
//! admin commands read while a chat request writes.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::errors::AgentError;
use super::types::{Session, StoredMessage, TurnRole};

/// Millisecond-precision UTC timestamp, e.g. `2025-06-01T08:30:12.345Z`.
const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

// ─── Database ───────────────────────────────────────────────────────────────

/// SQLite database handle for chat history.
pub struct AgentDatabase {
    conn: Connection,
}

impl AgentDatabase {
    /// Open (or create) the database at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, AgentError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<(), AgentError> {
        self.conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                created_at TEXT NOT NULL DEFAULT ({NOW_SQL}),
                last_activity TEXT NOT NULL DEFAULT ({NOW_SQL})
            );

            CREATE TABLE IF NOT EXISTS conversation_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL DEFAULT ({NOW_SQL}),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session
                ON conversation_messages(session_id, id);
            "
        ))?;
        Ok(())
    }

    // ─── Sessions ───────────────────────────────────────────────────────

    /// Create the session if it does not exist yet.
    ///
    /// A `user_id` is recorded only if the session has none.
    pub fn ensure_session(&self, session_id: &str, user_id: Option<&str>) -> Result<(), AgentError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO sessions (id, user_id) VALUES (?1, ?2)",
            params![session_id, user_id],
        )?;
        if user_id.is_some() {
            self.conn.execute(
                "UPDATE sessions SET user_id = ?2 WHERE id = ?1 AND user_id IS NULL",
                params![session_id, user_id],
            )?;
        }
        Ok(())
    }

    /// Get a session by ID.
    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>, AgentError> {
        let session = self
            .conn
            .query_row(
                "SELECT s.id, s.user_id, s.created_at, s.last_activity, COUNT(m.id)
                 FROM sessions s
                 LEFT JOIN conversation_messages m ON m.session_id = s.id
                 WHERE s.id = ?1
                 GROUP BY s.id",
                params![session_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// List all sessions, most recent activity first.
    ///
    /// Ordered by the newest message row rather than the timestamp text so
    /// two writes in the same millisecond still sort deterministically.
    pub fn list_sessions(&self) -> Result<Vec<Session>, AgentError> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.user_id, s.created_at, s.last_activity, COUNT(m.id)
             FROM sessions s
             LEFT JOIN conversation_messages m ON m.session_id = s.id
             GROUP BY s.id
             ORDER BY COALESCE(MAX(m.id), 0) DESC, s.rowid DESC",
        )?;
        let rows = stmt.query_map([], row_to_session)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// Delete a session and all its messages. Returns whether it existed.
    pub fn delete_session(&self, session_id: &str) -> Result<bool, AgentError> {
        self.conn.execute(
            "DELETE FROM conversation_messages WHERE session_id = ?1",
            params![session_id],
        )?;
        let removed = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(removed > 0)
    }

    // ─── Messages ───────────────────────────────────────────────────────

    /// Append a message, creating the session on first reference.
    pub fn insert_message(
        &self,
        session_id: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<i64, AgentError> {
        self.ensure_session(session_id, None)?;
        self.conn.execute(
            "INSERT INTO conversation_messages (session_id, role, content)
             VALUES (?1, ?2, ?3)",
            params![session_id, role.as_str(), content],
        )?;
        let id = self.conn.last_insert_rowid();

        self.conn.execute(
            &format!("UPDATE sessions SET last_activity = {NOW_SQL} WHERE id = ?1"),
            params![session_id],
        )?;
        Ok(id)
    }

    /// Get all messages for a session, oldest first.
    pub fn get_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, AgentError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, timestamp, role, content
             FROM conversation_messages
             WHERE session_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

// ─── Row Mapping ────────────────────────────────────────────────────────────

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: row.get(2)?,
        last_activity: row.get(3)?,
        message_count: row.get::<_, i64>(4)? as usize,
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let role: String = row.get(3)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        timestamp: row.get(2)?,
        role: TurnRole::parse_lenient(&role),
        content: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
