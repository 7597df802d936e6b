//! ConversationManager: durable per-session chat history.
//!
//! Responsibilities:
//! - Append turns to a session (created on first reference)
//! - Load a session's turns in order
//! - Session administration (list, inspect, delete)
//!
//! The generator depends only on [`ConversationStore`], so tests swap in an
//! in-memory database or a fake.

use std::sync::{Mutex, MutexGuard};

use super::database::AgentDatabase;
use super::errors::AgentError;
use super::types::{ConversationTurn, Session, StoredMessage, TurnRole};

// ─── ConversationStore ──────────────────────────────────────────────────────

/// Append-only conversation log keyed by session id.
///
/// Calls are short synchronous SQLite statements. There is no per-session
/// locking: two requests on one session interleave, last write wins.
pub trait ConversationStore: Send + Sync {
    fn append(&self, session_id: &str, role: TurnRole, content: &str) -> Result<(), AgentError>;

    /// All turns of a session, oldest first. Unknown sessions are empty.
    fn load(&self, session_id: &str) -> Result<Vec<ConversationTurn>, AgentError>;
}

// ─── ConversationManager ────────────────────────────────────────────────────

/// SQLite-backed [`ConversationStore`].
pub struct ConversationManager {
    db: Mutex<AgentDatabase>,
}

impl ConversationManager {
    pub fn new(db: AgentDatabase) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open the database file at `path` (or `:memory:`).
    pub fn open(path: &str) -> Result<Self, AgentError> {
        Ok(Self::new(AgentDatabase::open(path)?))
    }

    fn db(&self) -> Result<MutexGuard<'_, AgentDatabase>, AgentError> {
        self.db.lock().map_err(|e| AgentError::DatabaseError {
            reason: format!("database lock poisoned: {e}"),
        })
    }

    // ─── Sessions ───────────────────────────────────────────────────────

    /// Register a session (and its owner) before the first turn is written.
    pub fn open_session(&self, session_id: &str, user_id: Option<&str>) -> Result<(), AgentError> {
        self.db()?.ensure_session(session_id, user_id)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session, AgentError> {
        self.db()?
            .get_session(session_id)?
            .ok_or_else(|| AgentError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// All sessions, most recent activity first.
    pub fn list_sessions(&self) -> Result<Vec<Session>, AgentError> {
        self.db()?.list_sessions()
    }

    /// Delete a session and its messages.
    pub fn delete_session(&self, session_id: &str) -> Result<(), AgentError> {
        if self.db()?.delete_session(session_id)? {
            tracing::info!(session_id = %session_id, "session deleted");
            Ok(())
        } else {
            Err(AgentError::SessionNotFound {
                session_id: session_id.to_string(),
            })
        }
    }

    // ─── Messages ───────────────────────────────────────────────────────

    /// Stored rows for a session, with ids and timestamps.
    pub fn get_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, AgentError> {
        self.db()?.get_messages(session_id)
    }
}

impl ConversationStore for ConversationManager {
    fn append(&self, session_id: &str, role: TurnRole, content: &str) -> Result<(), AgentError> {
        self.db()?.insert_message(session_id, role, content)?;
        tracing::debug!(session_id = %session_id, role = %role, len = content.len(), "turn saved");
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Vec<ConversationTurn>, AgentError> {
        Ok(self
            .db()?
            .get_messages(session_id)?
            .iter()
            .map(StoredMessage::to_turn)
            .collect())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn manager() -> ConversationManager {
        ConversationManager::open(":memory:").unwrap()
    }

    #[test]
    fn test_append_then_load_round_trips_turns() {
        let store = manager();
        store.append("s1", TurnRole::User, "Tìm nhà 3 phòng ngủ ở Quận 7").unwrap();
        store.append("s1", TurnRole::Assistant, "Đây là một số lựa chọn...").unwrap();

        let turns = store.load("s1").unwrap();
        assert_eq!(
            turns,
            vec![
                ConversationTurn::user("Tìm nhà 3 phòng ngủ ở Quận 7"),
                ConversationTurn::assistant("Đây là một số lựa chọn..."),
            ]
        );
    }

    #[test]
    fn test_load_unknown_session_is_empty() {
        assert!(manager().load("never-seen").unwrap().is_empty());
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = manager();
        store.append("a", TurnRole::User, "from a").unwrap();
        store.append("b", TurnRole::User, "from b").unwrap();
        assert_eq!(store.load("a").unwrap().len(), 1);
        assert_eq!(store.load("b").unwrap()[0].content, "from b");
    }

    #[test]
    fn test_open_session_and_get() {
        let store = manager();
        store.open_session("s1", Some("user_1234abcd")).unwrap();
        let session = store.get_session("s1").unwrap();
        assert_eq!(session.user_id.as_deref(), Some("user_1234abcd"));
        assert_eq!(session.message_count, 0);
    }

    #[test]
    fn test_get_missing_session_is_not_found() {
        assert!(matches!(
            manager().get_session("nope"),
            Err(AgentError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_session() {
        let store = manager();
        store.append("s1", TurnRole::User, "q").unwrap();
        store.delete_session("s1").unwrap();
        assert!(store.load("s1").unwrap().is_empty());
        assert!(matches!(
            store.delete_session("s1"),
            Err(AgentError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_shared_across_threads() {
        let store = Arc::new(manager());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.append(&format!("s{i}"), TurnRole::User, "hello").unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.list_sessions().unwrap().len(), 4);
    }
}
