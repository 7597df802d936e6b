//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Callers do the
//! structured logging; these types only carry the endpoint, status and body
//! context a log entry needs.

use thiserror::Error;

/// Errors that can occur during inference operations.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Failed to parse a tool call from the model's response.
    #[error("tool call parse error: {reason}")]
    ToolCallParseError { raw_response: String, reason: String },

    /// The response body was not a valid chat completion.
    #[error("response parse error: {reason}")]
    ResponseParseError { reason: String },

    /// Every model in the fallback chain was unavailable.
    #[error("all models unavailable (tried: {})", attempted.join(", "))]
    AllModelsUnavailable { attempted: Vec<String> },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

/// Body fragments providers use when they refuse a tool-calling request.
///
/// Groq answers `400 tool_use_failed` when the generated call does not match
/// the declared schema; Ollama answers `500 error parsing tool call`.
const TOOL_REJECTION_MARKERS: &[&str] = &[
    "tool_use_failed",
    "tool call validation failed",
    "Failed to call a function",
    "error parsing tool call",
];

impl InferenceError {
    /// Whether the provider rejected the request because of its tool-calling
    /// payload. Only this class of error is retried without tools.
    pub fn is_tool_request_rejected(&self) -> bool {
        match self {
            InferenceError::HttpError { status, body } if *status == 400 || *status == 500 => {
                TOOL_REJECTION_MARKERS.iter().any(|m| body.contains(m))
            }
            InferenceError::ToolCallParseError { .. } => true,
            _ => false,
        }
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}
