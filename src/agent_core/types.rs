//! Shared types for the agent core.
//!
//! Conversation turns as the pipeline and store see them, the per-request
//! message list, and session metadata for the admin commands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::inference::types::{ChatMessage, Role, ToolCall};

// ─── Conversation Turns ─────────────────────────────────────────────────────

/// Who said a turn. Tool traffic is never stored, so there is no tool role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    /// Canonical lowercase name, as stored.
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => "system",
        }
    }

    /// Capitalized label used when rendering a transcript.
    pub fn label(self) -> &'static str {
        match self {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
            TurnRole::System => "System",
        }
    }

    /// Parse a stored role name.
    ///
    /// Accepts the legacy `human` / `ai` names. Anything unrecognised loads
    /// as `User` so a bad row never drops a turn.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "assistant" | "ai" => TurnRole::Assistant,
            "system" => TurnRole::System,
            _ => TurnRole::User,
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }
}

/// Render turns as `Role: content` lines.
pub fn render_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Pipeline Messages ──────────────────────────────────────────────────────

/// A message in the per-request working list.
///
/// Each variant carries exactly the fields its kind needs; conversion to the
/// wire format happens once, in [`PipelineMessage::to_chat_message`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String, tool_calls: Vec<ToolCall> },
    ToolResult { tool_call_id: String, content: String },
}

impl PipelineMessage {
    pub fn to_chat_message(&self) -> ChatMessage {
        match self {
            PipelineMessage::System { content } => ChatMessage::text(Role::System, content.clone()),
            PipelineMessage::User { content } => ChatMessage::text(Role::User, content.clone()),
            PipelineMessage::Assistant { content, tool_calls } => ChatMessage {
                role: Role::Assistant,
                content: Some(content.clone()),
                tool_call_id: None,
                tool_calls: (!tool_calls.is_empty())
                    .then(|| tool_calls.iter().map(ToolCall::to_response).collect()),
            },
            PipelineMessage::ToolResult {
                tool_call_id,
                content,
            } => ChatMessage {
                role: Role::Tool,
                content: Some(content.clone()),
                tool_call_id: Some(tool_call_id.clone()),
                tool_calls: None,
            },
        }
    }

    /// Tool output text, if this is a tool result.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            PipelineMessage::ToolResult { content, .. } => Some(content),
            _ => None,
        }
    }
}

/// Convert a message list to wire format.
pub fn to_chat_messages(messages: &[PipelineMessage]) -> Vec<ChatMessage> {
    messages.iter().map(PipelineMessage::to_chat_message).collect()
}

// ─── Stored Messages ────────────────────────────────────────────────────────

/// A turn as persisted in the conversation store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Auto-incremented row ID (set by DB on insert).
    pub id: i64,
    pub session_id: String,
    /// SQLite `datetime('now')` text (UTC).
    pub timestamp: String,
    pub role: TurnRole,
    pub content: String,
}

impl StoredMessage {
    pub fn to_turn(&self) -> ConversationTurn {
        ConversationTurn::new(self.role, self.content.clone())
    }
}

// ─── Sessions ───────────────────────────────────────────────────────────────

/// Metadata for a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque caller-supplied identifier.
    pub id: String,
    /// Owner, if the first writer supplied one.
    pub user_id: Option<String>,
    pub created_at: String,
    pub last_activity: String,
    pub message_count: usize,
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lenient_roles() {
        assert_eq!(TurnRole::parse_lenient("human"), TurnRole::User);
        assert_eq!(TurnRole::parse_lenient("user"), TurnRole::User);
        assert_eq!(TurnRole::parse_lenient("AI"), TurnRole::Assistant);
        assert_eq!(TurnRole::parse_lenient("assistant"), TurnRole::Assistant);
        assert_eq!(TurnRole::parse_lenient(" System "), TurnRole::System);
        assert_eq!(TurnRole::parse_lenient("tool"), TurnRole::User);
        assert_eq!(TurnRole::parse_lenient(""), TurnRole::User);
    }

    #[test]
    fn test_role_serde_is_lowercase() {
        let json = serde_json::to_string(&ConversationTurn::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_render_transcript() {
        let turns = vec![
            ConversationTurn::user("Giá nhà Quận 7?"),
            ConversationTurn::assistant("Khoảng 50 triệu/m2."),
        ];
        assert_eq!(
            render_transcript(&turns),
            "User: Giá nhà Quận 7?\nAssistant: Khoảng 50 triệu/m2."
        );
        assert_eq!(render_transcript(&[]), "");
    }

    #[test]
    fn test_tool_result_to_chat_message() {
        let msg = PipelineMessage::ToolResult {
            tool_call_id: "call_1".into(),
            content: "docs".into(),
        }
        .to_chat_message();
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.content.as_deref(), Some("docs"));
    }

    #[test]
    fn test_assistant_without_tool_calls_omits_field() {
        let msg = PipelineMessage::Assistant {
            content: "ok".into(),
            tool_calls: vec![],
        }
        .to_chat_message();
        assert!(msg.tool_calls.is_none());
    }

    #[test]
    fn test_assistant_with_tool_calls() {
        let msg = PipelineMessage::Assistant {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: "search_docs".into(),
                arguments: serde_json::json!({"query": "q"}),
            }],
        }
        .to_chat_message();
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "search_docs");
    }
}
