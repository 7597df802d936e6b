//! Token estimation and log-safe text truncation.
//!
//! Character heuristics only; good enough to log prompt growth per phase and
//! to notice when history summarization stops keeping up. Counts are in
//! `char`s rather than bytes because Vietnamese diacritics take 2-3 bytes each.

use crate::inference::types::{ChatMessage, Role};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Average characters per token for natural-language text.
///
/// Tokenizers split Vietnamese more finely than English, so this sits below
/// the usual ~4 chars/token to overestimate rather than underestimate.
const CHARS_PER_TOKEN: f64 = 3.0;

/// Retrieved documents and tool arguments are punctuation-heavy.
const DENSE_CHARS_PER_TOKEN: f64 = 2.6;

/// Per-message overhead (role label, formatting tokens).
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Overhead for tool call JSON structure (per call).
const TOOL_CALL_OVERHEAD_TOKENS: u32 = 10;

// ─── UTF-8 Safe Truncation ──────────────────────────────────────────────────

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// One-line preview for log fields: newlines flattened, cut at `max_bytes`
/// with a trailing `…` when shortened.
pub(crate) fn preview(s: &str, max_bytes: usize) -> String {
    let flat = s.replace(['\n', '\r'], " ");
    if flat.len() <= max_bytes {
        flat
    } else {
        format!("{}…", truncate_utf8(&flat, max_bytes))
    }
}

// ─── Public API ─────────────────────────────────────────────────────────────

/// Estimate the token count for natural-language text.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as f64 / CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for retrieved documents or JSON.
pub fn estimate_dense_tokens(text: &str) -> u32 {
    (text.chars().count() as f64 / DENSE_CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for one wire message, tool calls included.
pub fn estimate_message_tokens(message: &ChatMessage) -> u32 {
    let mut total = MESSAGE_OVERHEAD_TOKENS;

    if let Some(ref content) = message.content {
        total += match message.role {
            Role::Tool => estimate_dense_tokens(content),
            _ => estimate_tokens(content),
        };
    }

    if let Some(ref calls) = message.tool_calls {
        for call in calls {
            total += TOOL_CALL_OVERHEAD_TOKENS
                + estimate_tokens(&call.function.name)
                + estimate_dense_tokens(&call.function.arguments);
        }
    }

    total
}

/// Estimate the token count for a whole prompt.
pub fn estimate_prompt_tokens(messages: &[ChatMessage]) -> u32 {
    messages.iter().map(estimate_message_tokens).sum()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
