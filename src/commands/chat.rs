//! Ask a question within a session.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_core::{AgentError, ConversationStore, RealEstateListing};
use crate::RagApp;

// ─── Request / Response ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub user_input: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ChatRequest {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            session_id: None,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub result: Vec<RealEstateListing>,
    pub session_id: String,
    pub user_id: String,
}

// ─── Identifiers ────────────────────────────────────────────────────────────

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// A fresh session id (UUID v4).
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// A fresh anonymous user id: `user_` plus 8 hex chars.
pub fn new_user_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("user_{}", &hex[..8])
}

// ─── Command ────────────────────────────────────────────────────────────────

/// Answer one question.
///
/// Missing ids are generated and echoed back so the client can continue the
/// session. Stored history is loaded best-effort: if the store cannot be
/// read, the question is answered without history.
pub async fn ask(app: &RagApp, request: ChatRequest) -> Result<ChatResponse, AgentError> {
    let session_id = non_blank(request.session_id).unwrap_or_else(new_session_id);
    let user_id = non_blank(request.user_id).unwrap_or_else(new_user_id);

    if let Err(e) = app.conversations.open_session(&session_id, Some(&user_id)) {
        tracing::warn!(session_id = %session_id, error = %e, "failed to register session");
    }
    let history = app.conversations.load(&session_id).unwrap_or_else(|e| {
        tracing::warn!(session_id = %session_id, error = %e, "failed to load history, continuing without it");
        Vec::new()
    });

    let answer = app
        .generator
        .generate(&request.user_input, history, &session_id, &user_id)
        .await?;

    Ok(ChatResponse {
        response: answer.answer,
        result: answer.results,
        session_id,
        user_id,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
