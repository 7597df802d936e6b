//! Tool call argument parsing and repair.
//!
//! Hosted providers return `function.arguments` as a JSON-encoded string.
//! Models occasionally emit broken JSON there (stray quotes, trailing commas,
//! a missing closing brace), and Ollama reports the same breakage as an HTTP
//! 500 that embeds the raw arguments. Both paths funnel through
//! [`repair_malformed_tool_call_json`] before giving up.

use uuid::Uuid;

use super::errors::InferenceError;
use super::types::ToolCall;

// ─── Argument Parsing ────────────────────────────────────────────────────────

/// Build a [`ToolCall`] from the raw pieces a provider returned.
///
/// `arguments` may be a JSON string (OpenAI/Groq), an inline object
/// (some Ollama builds), or absent. Missing ids get a generated `call_<uuid>`.
pub fn parse_native_json_tool_call(
    id: Option<&str>,
    name: &str,
    arguments: &serde_json::Value,
) -> Result<ToolCall, InferenceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InferenceError::ToolCallParseError {
            raw_response: arguments.to_string(),
            reason: "empty tool name".into(),
        });
    }

    let arguments = match arguments {
        serde_json::Value::String(raw) => parse_arguments_str(raw)?,
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other.clone(),
    };

    Ok(ToolCall {
        id: id
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(new_call_id),
        name: name.to_string(),
        arguments,
    })
}

fn parse_arguments_str(raw: &str) -> Result<serde_json::Value, InferenceError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(v) => Ok(v),
        Err(e) => {
            let repaired = repair_malformed_tool_call_json(raw).ok_or_else(|| {
                InferenceError::ToolCallParseError {
                    raw_response: raw.to_string(),
                    reason: format!("invalid JSON arguments: {e}"),
                }
            })?;
            tracing::info!(raw_len = raw.len(), "repaired malformed tool call arguments");
            Ok(repaired)
        }
    }
}

/// Generate a fresh tool-call id.
pub fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

// ─── Provider Error Bodies ───────────────────────────────────────────────────

/// Pull the raw arguments out of an Ollama tool-call parse failure.
///
/// The body looks like
/// `{"error":{"message":"error parsing tool call: raw='{...}', err=..."}}`.
/// Ollama does not echo the tool name, so only the arguments are returned.
pub fn extract_tool_call_from_error(error_body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(error_body).ok()?;
    let message = parsed.pointer("/error/message")?.as_str()?;
    if !message.contains("error parsing tool call") {
        return None;
    }

    let start = message.find("raw='")? + "raw='".len();
    let len = message[start..].rfind("', err=")?;
    Some(message[start..start + len].to_string())
}

// ─── Malformed JSON Repair ──────────────────────────────────────────────────

type RepairStep = fn(&str) -> String;

/// Applied cumulatively, cheapest first. Parsing is retried after each step.
const REPAIR_STEPS: &[(&str, RepairStep)] = &[
    ("doubled_quote", collapse_doubled_quotes),
    ("trailing_comma", drop_trailing_commas),
    ("unbalanced_brace", close_open_braces),
    ("control_chars", strip_control_characters),
];

/// Attempt to repair malformed tool-call argument JSON.
///
/// Returns `None` if the text is still unparseable after every step.
pub fn repair_malformed_tool_call_json(raw: &str) -> Option<serde_json::Value> {
    if let Ok(v) = serde_json::from_str(raw) {
        return Some(v);
    }

    let mut candidate = raw.to_string();
    for (step, repair) in REPAIR_STEPS {
        candidate = repair(&candidate);
        if let Ok(v) = serde_json::from_str(&candidate) {
            tracing::debug!(step, "tool call JSON repaired");
            return Some(v);
        }
    }
    None
}

/// `"key":""value"` → `"key":"value"`. A real empty string (`:""` followed by
/// `,` or `}`) is left alone.
fn collapse_doubled_quotes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find(":\"\"") {
        let after = &rest[pos + 3..];
        let is_empty_value = after
            .chars()
            .next()
            .map_or(true, |c| c == ',' || c == '}');
        if is_empty_value {
            out.push_str(&rest[..pos + 3]);
        } else {
            out.push_str(&rest[..pos + 2]);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Remove a comma whose next non-space character closes an object or array.
fn drop_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, c) in input.char_indices() {
        if c == ',' {
            let next = input[i + 1..].trim_start().chars().next();
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Append `}` for every object left open outside string literals.
fn close_open_braces(input: &str) -> String {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in input.chars() {
        match (in_string, escaped, c) {
            (true, true, _) => escaped = false,
            (true, false, '\\') => escaped = true,
            (_, _, '"') => in_string = !in_string,
            (false, _, '{') => depth += 1,
            (false, _, '}') => depth -= 1,
            _ => {}
        }
    }

    let mut out = input.to_string();
    for _ in 0..depth.max(0) {
        out.push('}');
    }
    out
}

/// Drop control characters other than `\n`, `\r` and `\t`.
fn strip_control_characters(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
