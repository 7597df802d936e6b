//! Agent Core: the answer pipeline for the real-estate assistant.
//!
//! Submodules:
//! - `orchestrator`: Three-phase generator (decide, execute tools, synthesize)
//! - `tool_router`: Tool registry and sequential tool-call execution
//! - `summarizer`: Folds old turns into a summary to bound prompt size
//! - `prompts`: Prompt text for every model call
//! - `listing`: Structured answer and listing schema
//! - `answer_parser`: Reasoning-markup stripping and structured parsing
//! - `conversation`: Conversation store trait and its SQLite implementation
//! - `database`: SQLite schema for sessions and messages
//! - `tokens`: Token estimation and UTF-8 safe truncation
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod answer_parser;
pub mod conversation;
pub mod database;
pub mod errors;
pub mod listing;
pub mod orchestrator;
pub mod prompts;
pub mod summarizer;
pub mod tokens;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use conversation::{ConversationManager, ConversationStore};
pub use database::AgentDatabase;
pub use errors::AgentError;
pub use listing::{RealEstateListing, StructuredAnswer};
pub use orchestrator::{GeneratedAnswer, Orchestration, RagGenerator};
pub use summarizer::HistorySummarizer;
pub use tool_router::{SearchDocsTool, Tool, ToolInvocation, ToolOutcome, ToolRouter};
pub use types::{ConversationTurn, PipelineMessage, Session, StoredMessage, TurnRole};
