//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;

/// Errors that can occur in the answer pipeline and the conversation store.
///
/// Only `GenerationFailed` and `DatabaseError` normally reach a caller; the
/// tool, parse and summary variants are recovered inside the pipeline and
/// exist so they can be logged with a consistent shape.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Database operation failed.
    #[error("database error: {reason}")]
    DatabaseError { reason: String },

    /// Session not found.
    #[error("session not found: '{session_id}'")]
    SessionNotFound { session_id: String },

    /// The model requested a tool that is not registered.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// A registered tool failed while running.
    #[error("tool '{name}' failed: {reason}")]
    ToolExecutionError { name: String, reason: String },

    /// The final answer was not the expected JSON object.
    #[error("structured answer parse error: {reason}")]
    StructuredParseError { reason: String },

    /// History summarization failed.
    #[error("summarization failed: {reason}")]
    SummarizationError { reason: String },

    /// The language model gateway failed outside any recoverable path.
    #[error("generation failed: {0}")]
    GenerationFailed(#[from] InferenceError),
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::DatabaseError {
            reason: e.to_string(),
        }
    }
}
