//! Final-answer cleanup and structured parsing.
//!
//! Reasoning models wrap their deliberation in `<think>…</think>`; that is
//! removed before anything is shown or parsed. The remaining text should be
//! a single JSON object, but models add code fences or a lead-in sentence
//! often enough that both are tolerated.

use std::sync::LazyLock;

use regex::Regex;

use super::errors::AgentError;
use super::listing::StructuredAnswer;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").unwrap());

static UNTERMINATED_THINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*$").unwrap());

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap());

/// Remove reasoning blocks and surrounding whitespace.
///
/// An unterminated `<think>` (output cut off mid-thought) drops everything
/// from the tag onward.
pub fn strip_reasoning(text: &str) -> String {
    let stripped = THINK_BLOCK.replace_all(text, "");
    UNTERMINATED_THINK.replace(&stripped, "").trim().to_string()
}

/// Candidate JSON texts, most specific first: fenced block, the whole text,
/// then the outermost brace span.
fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    if let Some(inner) = CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        candidates.push(inner.as_str());
    }
    candidates.push(text);
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(&text[start..=end]);
        }
    }
    candidates
}

/// Parse already-stripped model output into a [`StructuredAnswer`].
pub fn parse_structured_answer(text: &str) -> Result<StructuredAnswer, AgentError> {
    let mut last_error = String::from("no JSON object found");
    for candidate in json_candidates(text) {
        match serde_json::from_str::<StructuredAnswer>(candidate) {
            Ok(answer) => return Ok(answer),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(AgentError::StructuredParseError { reason: last_error })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
