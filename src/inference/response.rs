//! Chat completion response normalization.
//!
//! Turns a raw `/chat/completions` body into a [`CompletionMessage`]. This is
//! the only place that knows which optional fields providers may omit.

use serde::Deserialize;

use super::errors::InferenceError;
use super::tool_call_parser::parse_native_json_tool_call;
use super::types::{CompletionMessage, ToolCall};

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Parse a non-streaming chat completion body.
///
/// Only the first choice is read. Tool-call arguments go through the
/// repairing parser; an argument blob that cannot be repaired fails the
/// whole response with `ToolCallParseError`.
pub fn parse_completion_response(body: &str) -> Result<CompletionMessage, InferenceError> {
    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::ResponseParseError {
            reason: format!("failed to parse completion body: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::ResponseParseError {
            reason: "empty choices array".into(),
        })?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .iter()
        .map(|tc| {
            parse_native_json_tool_call(tc.id.as_deref(), &tc.function.name, &tc.function.arguments)
        })
        .collect::<Result<Vec<ToolCall>, _>>()?;

    let finish_reason = if tool_calls.is_empty() {
        choice.finish_reason
    } else {
        Some("tool_calls".to_string())
    };

    Ok(CompletionMessage {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        finish_reason,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
