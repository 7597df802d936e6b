//! Tool-orchestrating answer generator.
//!
//! One request runs as a linear pipeline:
//! 1. **Decide**: the model sees the domain prompt, history and question with
//!    `search_docs` enabled, and either answers directly or requests tool calls
//! 2. **Execute tools**: requested calls run sequentially through the
//!    [`ToolRouter`]; a failing call becomes an error marker, never an abort
//! 3. **Synthesize**: tool outputs are joined into a context block and the
//!    model writes the final answer as `{response, result}` JSON with tools
//!    disabled
//!
//! The question and answer are then appended to the conversation store.
//! Only gateway failures outside the Phase 1 tool-less retry reach the caller.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;

use super::answer_parser::{parse_structured_answer, strip_reasoning};
use super::conversation::ConversationStore;
use super::errors::AgentError;
use super::listing::RealEstateListing;
use super::prompts::{build_context, synthesis_prompt, tool_decision_prompt};
use super::summarizer::HistorySummarizer;
use super::tool_router::{ToolInvocation, ToolRouter};
use super::types::{to_chat_messages, ConversationTurn, PipelineMessage, TurnRole};
use crate::agent_core::tokens::{estimate_prompt_tokens, preview};
use crate::inference::types::{CompletionMessage, ToolCall};
use crate::inference::ChatGateway;

// ─── Types ──────────────────────────────────────────────────────────────────

/// Final output of one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub results: Vec<RealEstateListing>,
}

impl GeneratedAnswer {
    fn text(answer: String) -> Self {
        Self {
            answer,
            results: Vec::new(),
        }
    }
}

// ─── Orchestration ──────────────────────────────────────────────────────────

/// The three phases of answering one question.
#[async_trait]
pub trait Orchestration: Send + Sync {
    /// Phase 1. Returns the model's reply; tool calls may be empty.
    async fn decide(&self, messages: &[PipelineMessage]) -> Result<CompletionMessage, AgentError>;

    /// Phase 2. One invocation per resolvable call, in call order.
    async fn execute_tools(&self, calls: &[ToolCall]) -> Vec<ToolInvocation>;

    /// Phase 3. Structured answer from the context block.
    async fn synthesize(
        &self,
        question: &str,
        history: &[ConversationTurn],
        context: &str,
    ) -> Result<GeneratedAnswer, AgentError>;
}

// ─── RagGenerator ───────────────────────────────────────────────────────────

pub struct RagGenerator {
    gateway: Arc<dyn ChatGateway>,
    router: Arc<ToolRouter>,
    store: Arc<dyn ConversationStore>,
    summarizer: Option<HistorySummarizer>,
}

impl RagGenerator {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        router: Arc<ToolRouter>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            gateway,
            router,
            store,
            summarizer: None,
        }
    }

    /// Compress long histories before they reach the prompt.
    pub fn with_summarizer(mut self, summarizer: HistorySummarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Answer `question` in the context of `history` and record the exchange
    /// under `session_id`.
    pub async fn generate(
        &self,
        question: &str,
        history: Vec<ConversationTurn>,
        session_id: &str,
        user_id: &str,
    ) -> Result<GeneratedAnswer, AgentError> {
        let started = Instant::now();
        let history_turns = history.len();
        let history = match &self.summarizer {
            Some(summarizer) => summarizer.summarize_and_truncate(history).await,
            None => history,
        };

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            history_turns,
            prompt_turns = history.len(),
            question = %preview(question, 120),
            "generation started"
        );

        // ── Phase 1: Decide ─────────────────────────────────────────────
        let mut messages = vec![
            PipelineMessage::System {
                content: tool_decision_prompt(&history, question),
            },
            PipelineMessage::User {
                content: question.to_string(),
            },
        ];
        let decision = self.decide(&messages).await.inspect_err(|e| {
            tracing::error!(session_id = %session_id, error = %e, "tool decision call failed");
        })?;

        if !decision.has_tool_calls() {
            let answer = strip_reasoning(&decision.content);
            tracing::info!(
                session_id = %session_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "answered directly, no tool call"
            );
            self.persist(session_id, question, &answer);
            return Ok(GeneratedAnswer::text(answer));
        }

        // ── Phase 2: Execute tools ──────────────────────────────────────
        messages.push(PipelineMessage::Assistant {
            content: decision.content.clone(),
            tool_calls: decision.tool_calls.clone(),
        });
        let invocations = self.execute_tools(&decision.tool_calls).await;
        messages.extend(invocations.iter().map(ToolInvocation::to_message));

        tracing::info!(
            session_id = %session_id,
            requested = decision.tool_calls.len(),
            executed = invocations.len(),
            failed = invocations.iter().filter(|i| i.is_error()).count(),
            message_count = messages.len(),
            prompt_tokens = estimate_prompt_tokens(&to_chat_messages(&messages)),
            "tool phase complete"
        );

        if invocations.is_empty() {
            let direct = strip_reasoning(&decision.content);
            if !direct.is_empty() {
                tracing::warn!(
                    session_id = %session_id,
                    "no requested tool was resolvable, using the direct reply"
                );
                self.persist(session_id, question, &direct);
                return Ok(GeneratedAnswer::text(direct));
            }
        }

        // ── Phase 3: Synthesize ─────────────────────────────────────────
        let outputs: Vec<&str> = messages.iter().filter_map(PipelineMessage::tool_output).collect();
        let context = build_context(&outputs);
        let answer = self
            .synthesize(question, &history, &context)
            .await
            .inspect_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "synthesis call failed");
            })?;

        tracing::info!(
            session_id = %session_id,
            results = answer.results.len(),
            context_len = context.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation complete"
        );
        self.persist(session_id, question, &answer.answer);
        Ok(answer)
    }

    /// Append the exchange to the store. Failures are logged and swallowed.
    fn persist(&self, session_id: &str, question: &str, answer: &str) {
        for (role, content) in [(TurnRole::User, question), (TurnRole::Assistant, answer)] {
            if let Err(e) = self.store.append(session_id, role, content) {
                tracing::warn!(
                    session_id = %session_id,
                    role = %role,
                    error = %e,
                    "failed to persist conversation turn"
                );
            }
        }
    }
}

#[async_trait]
impl Orchestration for RagGenerator {
    async fn decide(&self, messages: &[PipelineMessage]) -> Result<CompletionMessage, AgentError> {
        let tools = (!self.router.is_empty()).then(|| self.router.definitions());

        match self.gateway.complete(to_chat_messages(messages), tools).await {
            Ok(reply) => {
                tracing::debug!(
                    tool_calls = reply.tool_calls.len(),
                    content = %preview(&reply.content, 120),
                    "tool decision received"
                );
                Ok(reply)
            }
            Err(e) if e.is_tool_request_rejected() => {
                tracing::warn!(error = %e, "tool-calling request rejected, retrying without tools");
                let reply = self.gateway.complete(to_chat_messages(messages), None).await?;
                Ok(CompletionMessage {
                    tool_calls: Vec::new(),
                    ..reply
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn execute_tools(&self, calls: &[ToolCall]) -> Vec<ToolInvocation> {
        self.router.execute(calls).await
    }

    async fn synthesize(
        &self,
        question: &str,
        history: &[ConversationTurn],
        context: &str,
    ) -> Result<GeneratedAnswer, AgentError> {
        let messages = [
            PipelineMessage::System {
                content: synthesis_prompt(history, context, question),
            },
            PipelineMessage::User {
                content: question.to_string(),
            },
        ];
        let reply = self.gateway.complete(to_chat_messages(&messages), None).await?;
        let text = strip_reasoning(&reply.content);

        match parse_structured_answer(&text) {
            Ok(structured) => Ok(GeneratedAnswer {
                answer: structured.response,
                results: structured.result,
            }),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw = %preview(&text, 200),
                    "final answer is not structured JSON, returning raw text"
                );
                Ok(GeneratedAnswer::text(text))
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
