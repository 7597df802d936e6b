//! The retriever contract and its request type.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use super::errors::RetrievalError;

/// Result count when the caller gives none.
pub const DEFAULT_TOP_K: u32 = 3;

// ─── Retriever ───────────────────────────────────────────────────────────────

/// Read-only document search.
///
/// Implementations return formatted document text, or the no-results
/// sentinel when nothing matched. `Err` is reserved for infrastructure
/// faults (unreachable store, bad response).
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<String, RetrievalError>;
}

// ─── SearchRequest ───────────────────────────────────────────────────────────

/// Arguments of one document search.
///
/// `metadata_filter` maps metadata keys to scalar values; an empty map means
/// no filter. Keys are ordered so the same filter always serializes the same.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: u32,
    pub with_score: bool,
    pub metadata_filter: BTreeMap<String, serde_json::Value>,
}

impl SearchRequest {
    /// A plain query with default options.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            with_score: false,
            metadata_filter: BTreeMap::new(),
        }
    }

    /// Build a request from model-supplied tool arguments.
    ///
    /// Tolerates the shapes models actually emit: numbers and booleans as
    /// strings, `null` for the filter, missing fields. `top_k` falls back to
    /// `default_top_k` when absent and is clamped to at least 1. Non-scalar
    /// filter values are dropped.
    pub fn from_arguments(
        arguments: &serde_json::Value,
        default_top_k: u32,
    ) -> Result<Self, RetrievalError> {
        let raw: RawSearchArgs = serde_json::from_value(arguments.clone()).map_err(|e| {
            RetrievalError::InvalidArguments {
                reason: e.to_string(),
            }
        })?;

        let metadata_filter = raw
            .metadata_filter
            .unwrap_or_default()
            .into_iter()
            .filter(|(key, value)| {
                let keep = is_scalar(value);
                if !keep {
                    tracing::warn!(key = %key, "dropping non-scalar metadata filter value");
                }
                keep
            })
            .collect();

        Ok(Self {
            query: raw.query.unwrap_or_default(),
            top_k: raw.top_k.unwrap_or(default_top_k).max(1),
            with_score: raw.with_score.unwrap_or(false),
            metadata_filter,
        })
    }

    /// JSON schema advertised to the model for these arguments.
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The user's question, copied verbatim. Do not rewrite or translate it."
                },
                "top_k": {
                    "type": "integer",
                    "description": "Number of results to return",
                    "default": DEFAULT_TOP_K
                },
                "with_score": {
                    "type": "boolean",
                    "description": "Whether to return the score of the results",
                    "default": false
                },
                "metadata_filter": {
                    "type": "object",
                    "description": "Optional metadata filter for search. If unused, omit this field; do not send null."
                }
            },
            "required": ["query"]
        })
    }
}

fn is_scalar(value: &serde_json::Value) -> bool {
    matches!(
        value,
        serde_json::Value::String(_) | serde_json::Value::Number(_) | serde_json::Value::Bool(_)
    )
}

// ─── Lenient argument parsing ────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawSearchArgs {
    #[serde(default, deserialize_with = "lenient_string")]
    query: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    top_k: Option<u32>,
    #[serde(default, deserialize_with = "lenient_bool")]
    with_score: Option<bool>,
    #[serde(default)]
    metadata_filter: Option<BTreeMap<String, serde_json::Value>>,
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(d)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    let parsed = match &value {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(|n| Some(n.min(u32::MAX as u64) as u32))
        .ok_or_else(|| serde::de::Error::custom(format!("top_k must be a positive integer, got {value}")))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    match &value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Bool(b) => Ok(Some(*b)),
        serde_json::Value::Number(n) => Ok(Some(n.as_f64().unwrap_or(0.0) != 0.0)),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" | "" => Ok(Some(false)),
            _ => Err(serde::de::Error::custom(format!("with_score is not a boolean: {s}"))),
        },
        _ => Err(serde::de::Error::custom(format!("with_score is not a boolean: {value}"))),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
