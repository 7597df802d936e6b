//! History summarization: keeps the prompt bounded as a session grows.
//!
//! The last `keep_last` turns are kept verbatim. Anything older is folded
//! into one synthetic system turn produced by the model. If the model call
//! fails the older turns are simply dropped.

use std::sync::Arc;
use std::time::Instant;

use super::answer_parser::strip_reasoning;
use super::errors::AgentError;
use super::prompts::{summary_prompt, SUMMARY_PREFIX};
use super::types::ConversationTurn;
use crate::agent_core::tokens::{estimate_tokens, preview};
use crate::inference::types::{ChatMessage, Role};
use crate::inference::ChatGateway;

pub struct HistorySummarizer {
    gateway: Arc<dyn ChatGateway>,
    keep_last: usize,
}

impl HistorySummarizer {
    pub fn new(gateway: Arc<dyn ChatGateway>, keep_last: usize) -> Self {
        Self { gateway, keep_last }
    }

    /// Return `turns` unchanged when short enough, otherwise
    /// `[summary_turn] + last keep_last turns`.
    ///
    /// Never fails: a summarization error degrades to the recent turns only.
    pub async fn summarize_and_truncate(&self, turns: Vec<ConversationTurn>) -> Vec<ConversationTurn> {
        if turns.len() <= self.keep_last {
            return turns;
        }

        let split = turns.len() - self.keep_last;
        let (old, recent) = turns.split_at(split);

        match self.summarize(old).await {
            Ok(summary) => {
                let mut out = Vec::with_capacity(recent.len() + 1);
                out.push(ConversationTurn::system(format!("{SUMMARY_PREFIX}{summary}")));
                out.extend_from_slice(recent);
                out
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    dropped_turns = old.len(),
                    kept_turns = recent.len(),
                    "history summarization failed, keeping recent turns only"
                );
                recent.to_vec()
            }
        }
    }

    /// Ask the model for a 2-3 sentence summary of `old`.
    async fn summarize(&self, old: &[ConversationTurn]) -> Result<String, AgentError> {
        let started = Instant::now();
        let prompt = summary_prompt(old);
        let input_tokens = estimate_tokens(&prompt);

        let reply = self
            .gateway
            .complete(vec![ChatMessage::text(Role::User, prompt)], None)
            .await
            .map_err(|e| AgentError::SummarizationError {
                reason: e.to_string(),
            })?;

        let summary = strip_reasoning(&reply.content);
        if summary.is_empty() {
            return Err(AgentError::SummarizationError {
                reason: "model returned an empty summary".to_string(),
            });
        }

        tracing::info!(
            summarized_turns = old.len(),
            input_tokens,
            summary_tokens = estimate_tokens(&summary),
            elapsed_ms = started.elapsed().as_millis() as u64,
            summary = %preview(&summary, 120),
            "history summarized"
        );
        Ok(summary)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::{CompletionMessage, ToolDefinition};
    use crate::inference::InferenceError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Gateway returning a fixed reply and recording prompts.
    struct FixedGateway {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedGateway {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatGateway for FixedGateway {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            tools: Option<Vec<ToolDefinition>>,
        ) -> Result<CompletionMessage, InferenceError> {
            assert!(tools.is_none());
            self.prompts
                .lock()
                .unwrap()
                .push(messages[0].content.clone().unwrap_or_default());
            match &self.reply {
                Ok(text) => Ok(CompletionMessage::text(text.clone())),
                Err(()) => Err(InferenceError::Timeout { duration_secs: 60 }),
            }
        }
    }

    fn turns(n: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ConversationTurn::user(format!("q{i}"))
                } else {
                    ConversationTurn::assistant(format!("a{i}"))
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_short_history_unchanged_without_model_call() {
        let gateway = FixedGateway::ok("unused");
        let summarizer = HistorySummarizer::new(gateway.clone(), 5);
        let input = turns(3);
        assert_eq!(summarizer.summarize_and_truncate(input.clone()).await, input);
        assert_eq!(summarizer.summarize_and_truncate(turns(5)).await, turns(5));
        assert!(gateway.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_long_history_summarized() {
        let gateway = FixedGateway::ok("<think>hmm</think> User asked about Quận 7 apartments.");
        let summarizer = HistorySummarizer::new(gateway.clone(), 5);
        let input = turns(8);

        let out = summarizer.summarize_and_truncate(input.clone()).await;
        assert_eq!(out.len(), 6);
        assert_eq!(
            out[0],
            ConversationTurn::system("Previous conversation summary: User asked about Quận 7 apartments.")
        );
        assert_eq!(&out[1..], &input[3..8]);

        let prompts = gateway.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("User: q0\nAssistant: a1\nUser: q2"));
    }

    #[tokio::test]
    async fn test_failure_keeps_recent_only() {
        let summarizer = HistorySummarizer::new(FixedGateway::failing(), 5);
        let input = turns(8);
        let out = summarizer.summarize_and_truncate(input.clone()).await;
        assert_eq!(out, input[3..8].to_vec());
    }

    #[tokio::test]
    async fn test_empty_summary_treated_as_failure() {
        let summarizer = HistorySummarizer::new(FixedGateway::ok("<think>only thoughts</think>"), 2);
        let out = summarizer.summarize_and_truncate(turns(4)).await;
        assert_eq!(out, turns(4)[2..].to_vec());
    }

    #[tokio::test]
    async fn test_keep_last_zero_summarizes_everything() {
        let summarizer = HistorySummarizer::new(FixedGateway::ok("tóm tắt"), 0);
        let out = summarizer.summarize_and_truncate(turns(2)).await;
        assert_eq!(out, vec![ConversationTurn::system("Previous conversation summary: tóm tắt")]);
    }
}
