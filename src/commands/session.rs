//! Session administration: list, load and delete conversation sessions.

use serde::Serialize;

use crate::agent_core::tokens::truncate_utf8;
use crate::agent_core::{AgentError, StoredMessage, TurnRole};
use crate::RagApp;

/// Preview length, in bytes, before the `…` suffix.
const PREVIEW_BYTES: usize = 77;

// ─── Response Types ─────────────────────────────────────────────────────────

/// Summary of a session for a history list.
#[derive(Debug, Serialize)]
pub struct SessionListItem {
    pub id: String,
    pub user_id: Option<String>,
    pub created_at: String,
    pub last_activity: String,
    pub message_count: usize,
    /// First user question, shortened.
    pub preview: Option<String>,
}

// ─── Commands ───────────────────────────────────────────────────────────────

/// List sessions that contain at least one message, most recent first.
pub fn list_sessions(app: &RagApp) -> Result<Vec<SessionListItem>, AgentError> {
    let sessions = app.conversations.list_sessions()?;

    let mut items = Vec::new();
    for session in sessions {
        if session.message_count == 0 {
            continue;
        }

        let preview = app
            .conversations
            .get_messages(&session.id)?
            .into_iter()
            .find(|m| m.role == TurnRole::User)
            .map(|m| {
                if m.content.len() > PREVIEW_BYTES + 3 {
                    format!("{}…", truncate_utf8(&m.content, PREVIEW_BYTES))
                } else {
                    m.content
                }
            });

        items.push(SessionListItem {
            id: session.id,
            user_id: session.user_id,
            created_at: session.created_at,
            last_activity: session.last_activity,
            message_count: session.message_count,
            preview,
        });
    }

    Ok(items)
}

/// Load a session's stored messages, oldest first.
pub fn load_session(app: &RagApp, session_id: &str) -> Result<Vec<StoredMessage>, AgentError> {
    app.conversations.get_session(session_id)?;
    app.conversations.get_messages(session_id)
}

/// Delete a session and all its messages.
pub fn delete_session(app: &RagApp, session_id: &str) -> Result<(), AgentError> {
    app.conversations.delete_session(session_id)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::{ConversationManager, ConversationStore};
    use crate::inference::config::parse_config;
    use crate::inference::types::{ChatMessage, CompletionMessage, ToolDefinition};
    use crate::inference::{ChatGateway, InferenceError};
    use crate::retrieval::{RetrievalError, Retriever, SearchRequest};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Unused;

    #[async_trait]
    impl ChatGateway for Unused {
        async fn complete(
            &self,
            _: Vec<ChatMessage>,
            _: Option<Vec<ToolDefinition>>,
        ) -> Result<CompletionMessage, InferenceError> {
            Err(InferenceError::Timeout { duration_secs: 1 })
        }
    }

    #[async_trait]
    impl Retriever for Unused {
        async fn search(&self, _: &SearchRequest) -> Result<String, RetrievalError> {
            Err(RetrievalError::RequestFailed {
                reason: "unused".into(),
            })
        }
    }

    fn app() -> RagApp {
        let config = parse_config(
            "active_model: m\nmodels:\n  m:\n    display_name: M\n    provider: groq\n    model_name: m\n",
        )
        .unwrap();
        RagApp::new(
            config,
            Arc::new(Unused),
            Arc::new(Unused),
            Arc::new(Unused),
            Arc::new(ConversationManager::open(":memory:").unwrap()),
        )
    }

    #[test]
    fn test_list_sessions_skips_empty_and_previews_first_question() {
        let app = app();
        let long_question = "Tôi muốn tìm một căn hộ ba phòng ngủ gần trường quốc tế ở Quận 7, giá dưới sáu tỷ đồng";
        app.conversations.append("a", TurnRole::User, long_question).unwrap();
        app.conversations.append("a", TurnRole::Assistant, "ok").unwrap();
        app.conversations.append("b", TurnRole::User, "Giá đất Thủ Đức?").unwrap();
        app.conversations.open_session("empty", Some("user_00000000")).unwrap();

        let items = list_sessions(&app).unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(items[0].preview.as_deref(), Some("Giá đất Thủ Đức?"));

        let preview = items[1].preview.as_deref().unwrap();
        assert!(preview.ends_with('…'));
        assert!(preview.len() <= PREVIEW_BYTES + '…'.len_utf8());
        assert_eq!(items[1].message_count, 2);
    }

    #[test]
    fn test_load_session() {
        let app = app();
        app.conversations.append("s1", TurnRole::User, "q").unwrap();
        app.conversations.append("s1", TurnRole::Assistant, "a").unwrap();

        let messages = load_session(&app, "s1").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, TurnRole::Assistant);
        assert!(matches!(
            load_session(&app, "missing"),
            Err(AgentError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_session() {
        let app = app();
        app.conversations.append("s1", TurnRole::User, "q").unwrap();
        delete_session(&app, "s1").unwrap();
        assert!(list_sessions(&app).unwrap().is_empty());
        assert!(delete_session(&app, "s1").is_err());
    }
}
