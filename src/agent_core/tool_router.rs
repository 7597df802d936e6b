//! ToolRouter: resolves model tool calls against the tool registry and runs them.
//!
//! Handles:
//! - Name resolution (case-insensitive; unknown names are skipped)
//! - Expansion of nested `tool_calls` arguments into sub-calls
//! - Sequential execution in call order
//! - Per-call outcome capture: a failing tool yields an error marker as its
//!   output and never stops the batch

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent_core::tokens::preview;
use crate::inference::tool_call_parser::parse_native_json_tool_call;
use crate::inference::types::{ToolCall, ToolDefinition};
use crate::retrieval::{Retriever, SearchRequest};

use super::errors::AgentError;
use super::types::PipelineMessage;

// ─── Tool ───────────────────────────────────────────────────────────────────

/// A capability the model can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key, lowercase.
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    async fn invoke(&self, arguments: &Value) -> Result<String, AgentError>;
}

/// Document search over the vector store.
pub struct SearchDocsTool {
    retriever: Arc<dyn Retriever>,
    default_top_k: u32,
}

impl SearchDocsTool {
    pub const NAME: &'static str = "search_docs";

    pub fn new(retriever: Arc<dyn Retriever>, default_top_k: u32) -> Self {
        Self {
            retriever,
            default_top_k,
        }
    }
}

#[async_trait]
impl Tool for SearchDocsTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            Self::NAME,
            "Retrieve documents from Chroma.\n\n\
             Args:\n\
             \x20   query: The search query\n\
             \x20   top_k: Number of results to return\n\
             \x20   with_score: Whether to return the score of the results\n\
             \x20   metadata_filter: Optional metadata filter for search",
            SearchRequest::json_schema(),
        )
    }

    async fn invoke(&self, arguments: &Value) -> Result<String, AgentError> {
        let request = SearchRequest::from_arguments(arguments, self.default_top_k).map_err(|e| {
            AgentError::ToolExecutionError {
                name: Self::NAME.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.retriever
            .search(&request)
            .await
            .map_err(|e| AgentError::ToolExecutionError {
                name: Self::NAME.to_string(),
                reason: e.to_string(),
            })
    }
}

// ─── Invocation Results ─────────────────────────────────────────────────────

/// Result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Ok(String),
    Error(String),
}

/// One executed tool call, correlated to the model's call id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    pub outcome: ToolOutcome,
}

impl ToolInvocation {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }

    /// Text that goes into the context block.
    pub fn output_text(&self) -> String {
        match &self.outcome {
            ToolOutcome::Ok(output) => output.clone(),
            ToolOutcome::Error(reason) => format!("[Error executing {}: {reason}]", self.name),
        }
    }

    pub fn to_message(&self) -> PipelineMessage {
        PipelineMessage::ToolResult {
            tool_call_id: self.call_id.clone(),
            content: self.output_text(),
        }
    }
}

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRouter {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a tool with the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_ascii_lowercase(), tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Definitions advertised to the model, in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn resolve(&self, name: &str) -> Result<&Arc<dyn Tool>, AgentError> {
        self.tools
            .get(&name.trim().to_ascii_lowercase())
            .ok_or_else(|| AgentError::UnknownTool {
                name: name.to_string(),
            })
    }

    // ─── Execution ──────────────────────────────────────────────────────

    /// Execute a batch of tool calls sequentially, in call order.
    ///
    /// Calls naming an unregistered tool produce no invocation. Every other
    /// call produces exactly one, whether the tool succeeded or not.
    pub async fn execute(&self, calls: &[ToolCall]) -> Vec<ToolInvocation> {
        let mut invocations = Vec::new();
        for call in calls {
            for sub_call in expand_nested_calls(call) {
                match self.resolve(&sub_call.name) {
                    Ok(tool) => {
                        let invocation = self.run(tool, sub_call).await;
                        invocations.push(invocation);
                    }
                    Err(e) => {
                        tracing::warn!(
                            tool = %sub_call.name,
                            call_id = %sub_call.id,
                            error = %e,
                            "model requested unknown tool, skipping call"
                        );
                    }
                }
            }
        }
        invocations
    }

    async fn run(&self, tool: &Arc<dyn Tool>, call: ToolCall) -> ToolInvocation {
        let started = Instant::now();
        let outcome = match tool.invoke(&call.arguments).await {
            Ok(output) => {
                tracing::info!(
                    tool = %tool.name(),
                    call_id = %call.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    output_len = output.len(),
                    output = %preview(&output, 160),
                    "tool call succeeded"
                );
                ToolOutcome::Ok(output)
            }
            Err(e) => {
                let reason = match e {
                    AgentError::ToolExecutionError { reason, .. } => reason,
                    other => other.to_string(),
                };
                tracing::warn!(
                    tool = %tool.name(),
                    call_id = %call.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %reason,
                    "tool call failed"
                );
                ToolOutcome::Error(reason)
            }
        };

        ToolInvocation {
            call_id: call.id,
            name: tool.name().to_string(),
            arguments: call.arguments,
            outcome,
        }
    }
}

// ─── Nested Calls ───────────────────────────────────────────────────────────

/// Split a call whose arguments carry a `tool_calls` array into its
/// sub-calls. Sub-calls keep the parent's call id so their results stay
/// correlated to a call the model actually issued.
///
/// Each entry may be `{name, arguments}` or OpenAI-shaped
/// `{function: {name, arguments}}`, with arguments as an object or a JSON
/// string. Entries without a usable name are dropped.
fn expand_nested_calls(call: &ToolCall) -> Vec<ToolCall> {
    let Some(nested) = call.arguments.get("tool_calls").and_then(Value::as_array) else {
        return vec![call.clone()];
    };

    let mut expanded = Vec::with_capacity(nested.len());
    for entry in nested {
        let function = entry.get("function").unwrap_or(entry);
        let name = function.get("name").and_then(Value::as_str).unwrap_or_default();
        let arguments = function
            .get("arguments")
            .or_else(|| function.get("args"))
            .unwrap_or(&Value::Null);

        match parse_native_json_tool_call(Some(call.id.as_str()), name, arguments) {
            Ok(sub_call) => expanded.push(sub_call),
            Err(e) => {
                tracing::warn!(call_id = %call.id, error = %e, "dropping malformed nested tool call");
            }
        }
    }
    tracing::debug!(call_id = %call.id, sub_calls = expanded.len(), "expanded nested tool calls");
    expanded
}

// ─── Tests ──────────────────────────────────────────────────────────────────
