//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests to Groq, OpenAI or Ollama and
//! normalizes the reply into a [`CompletionMessage`]. Walks the fallback chain
//! when the pinned model is unreachable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::config::{AppConfig, ModelConfig};
use super::errors::InferenceError;
use super::response::parse_completion_response;
use super::tool_call_parser::{
    extract_tool_call_from_error, new_call_id, repair_malformed_tool_call_json,
};
use super::types::{ChatCompletionRequest, ChatMessage, CompletionMessage, ToolCall, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout. Total request time is per model (`timeout_secs`).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── ChatGateway ─────────────────────────────────────────────────────────────

/// Stateless request/response access to a chat-completion model.
///
/// `tools = None` disables tool calling for that request.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionMessage, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for an OpenAI-compatible chat-completions endpoint.
///
/// Holds no per-request state, so one instance is shared across requests.
/// Failover is computed per call: the pinned model first, then every
/// `fallback_chain` entry that is not the pinned model.
pub struct InferenceClient {
    http: HttpClient,
    models: HashMap<String, ModelConfig>,
    /// Model keys in the order they are tried.
    candidates: Vec<String>,
}

impl InferenceClient {
    /// Create a client pinned to `active_model`.
    pub fn from_config(config: &AppConfig) -> Result<Self, InferenceError> {
        Self::from_config_with_model(config, &config.active_model)
    }

    /// Create a client pinned to a specific model key.
    ///
    /// The summarizer uses this to run on a different (usually smaller) model
    /// than the generator while sharing the same fallback chain.
    pub fn from_config_with_model(
        config: &AppConfig,
        model_key: &str,
    ) -> Result<Self, InferenceError> {
        let model = config
            .models
            .get(model_key)
            .ok_or_else(|| InferenceError::ConfigError {
                reason: format!("model '{model_key}' not found in config"),
            })?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: model.endpoint(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let mut candidates = vec![model_key.to_string()];
        for key in &config.fallback_chain {
            if candidates.contains(key) {
                continue;
            }
            if config.models.contains_key(key) {
                candidates.push(key.clone());
            } else {
                tracing::warn!(model = %key, "fallback chain entry not in models, skipping");
            }
        }

        Ok(Self {
            http,
            models: config.models.clone(),
            candidates,
        })
    }

    /// Key of the pinned model.
    pub fn model_key(&self) -> &str {
        &self.candidates[0]
    }

    /// Display name of the pinned model.
    pub fn current_model_name(&self) -> &str {
        self.models
            .get(self.model_key())
            .map(|m| m.display_name.as_str())
            .unwrap_or("unknown")
    }

    // ─── Chat Completion ─────────────────────────────────────────────────

    /// Send one chat completion, failing over along the candidate list.
    ///
    /// A provider-side tool-call rejection is never failed over: the same
    /// prompt would be rejected again, and the caller owns the tool-less
    /// retry. Ollama's `error parsing tool call` body is repaired locally
    /// when possible.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionMessage, InferenceError> {
        let mut attempted: Vec<String> = Vec::new();
        let mut last_error: Option<InferenceError> = None;

        for key in &self.candidates {
            let Some(model) = self.models.get(key) else {
                continue;
            };

            match self.try_request(key, model, &messages, &tools).await {
                Ok(message) => {
                    if !attempted.is_empty() {
                        tracing::info!(model = %key, skipped = ?attempted, "served by fallback model");
                    }
                    return Ok(message);
                }
                Err(e) if e.is_tool_request_rejected() => {
                    if let Some(repaired) = Self::try_repair_from_error(&e, tools.as_deref()) {
                        tracing::info!(model = %key, "repaired malformed tool call from error body");
                        return Ok(repaired);
                    }
                    return Err(e);
                }
                Err(e) if Self::is_retriable(&e) => {
                    tracing::warn!(model = %key, error = %e, "model unavailable, trying next");
                    attempted.push(key.clone());
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_error {
            Some(e) if attempted.len() <= 1 => Err(e),
            _ => Err(InferenceError::AllModelsUnavailable { attempted }),
        }
    }

    /// Attempt a single request to one model.
    async fn try_request(
        &self,
        key: &str,
        model: &ModelConfig,
        messages: &[ChatMessage],
        tools: &Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionMessage, InferenceError> {
        let url = format!("{}/chat/completions", model.endpoint());
        let body = ChatCompletionRequest {
            model: model.model_name.clone(),
            messages: messages.to_vec(),
            tools: tools.clone(),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            temperature: model.temperature,
            top_p: model.top_p,
            max_tokens: model.max_tokens,
            stream: false,
        };

        // Metadata only; bodies carry the full chat history.
        tracing::info!(
            url = %url,
            model_key = %key,
            model = %body.model,
            message_count = body.messages.len(),
            has_tools = body.tools.is_some(),
            max_tokens = body.max_tokens,
            "=== LLM REQUEST ==="
        );

        let started = Instant::now();
        let mut request = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(model.timeout_secs))
            .json(&body);
        if let Some(token) = model.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: model.timeout_secs,
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: model.timeout_secs,
                }
            } else {
                InferenceError::ResponseParseError {
                    reason: format!("failed to read response body: {e}"),
                }
            }
        })?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                body = %crate::agent_core::tokens::truncate_utf8(&body_text, 300),
                "LLM request failed"
            );
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let message = parse_completion_response(&body_text)?;
        tracing::info!(
            model_key = %key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            tool_calls = message.tool_calls.len(),
            content_len = message.content.len(),
            "=== LLM RESPONSE ==="
        );
        Ok(message)
    }

    // ─── Tool Call Repair ──────────────────────────────────────────────────

    /// Rebuild a tool call from an Ollama `error parsing tool call` body.
    ///
    /// The body carries the arguments but not the tool name, so repair is only
    /// attempted when exactly one tool was offered.
    fn try_repair_from_error(
        err: &InferenceError,
        tools: Option<&[ToolDefinition]>,
    ) -> Option<CompletionMessage> {
        let [only_tool] = tools? else {
            return None;
        };
        let raw_args = extract_tool_call_from_error(err.error_body()?)?;
        let arguments = repair_malformed_tool_call_json(&raw_args)?;

        Some(CompletionMessage {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: new_call_id(),
                name: only_tool.function.name.clone(),
                arguments,
            }],
            finish_reason: Some("tool_calls".to_string()),
        })
    }

    // ─── Fallback Chain ──────────────────────────────────────────────────

    /// Whether an error should move on to the next model.
    ///
    /// 404 covers an Ollama model that is not pulled; 429 a Groq rate limit.
    fn is_retriable(err: &InferenceError) -> bool {
        matches!(
            err,
            InferenceError::ConnectionFailed { .. }
                | InferenceError::Timeout { .. }
                | InferenceError::HttpError { status: 404, .. }
                | InferenceError::HttpError { status: 429, .. }
                | InferenceError::HttpError { status: 500, .. }
                | InferenceError::HttpError { status: 502..=504, .. }
        )
    }
}

#[async_trait]
impl ChatGateway for InferenceClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionMessage, InferenceError> {
        self.chat_completion(messages, tools).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::config::parse_config;
    use crate::inference::types::Role;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_config(primary_url: &str, fallback_url: &str) -> AppConfig {
        let yaml = format!(
            r#"
active_model: model-a
models:
  model-a:
    display_name: "Model A"
    provider: ollama
    model_name: "model-a:latest"
    base_url: "{primary_url}"
    timeout_secs: 5
  model-b:
    display_name: "Model B"
    provider: ollama
    model_name: "model-b:latest"
    base_url: "{fallback_url}"
    timeout_secs: 5
fallback_chain: [model-a, model-b, ghost]
"#
        );
        parse_config(&yaml).unwrap()
    }

    /// Serve one canned HTTP response on an ephemeral port.
    async fn serve_once(status_line: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/v1")
    }

    fn user(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::text(Role::User, text)]
    }

    fn search_tool() -> ToolDefinition {
        ToolDefinition::function("search_docs", "search", serde_json::json!({"type": "object"}))
    }

    #[test]
    fn test_from_config_selects_active_model() {
        let client = InferenceClient::from_config(&test_config("http://a", "http://b")).unwrap();
        assert_eq!(client.model_key(), "model-a");
        assert_eq!(client.current_model_name(), "Model A");
    }

    #[test]
    fn test_candidates_skip_duplicates_and_unknown_keys() {
        let client = InferenceClient::from_config(&test_config("http://a", "http://b")).unwrap();
        assert_eq!(client.candidates, vec!["model-a", "model-b"]);
    }

    #[test]
    fn test_pinned_model_goes_first() {
        let config = test_config("http://a", "http://b");
        let client = InferenceClient::from_config_with_model(&config, "model-b").unwrap();
        assert_eq!(client.candidates, vec!["model-b", "model-a"]);
    }

    #[test]
    fn test_unknown_pinned_model_is_config_error() {
        let config = test_config("http://a", "http://b");
        let result = InferenceClient::from_config_with_model(&config, "nope");
        assert!(matches!(result, Err(InferenceError::ConfigError { .. })));
    }

    #[test]
    fn test_is_retriable() {
        assert!(InferenceClient::is_retriable(&InferenceError::ConnectionFailed {
            endpoint: "".into(),
            reason: "".into()
        }));
        assert!(InferenceClient::is_retriable(&InferenceError::Timeout { duration_secs: 5 }));
        assert!(InferenceClient::is_retriable(&InferenceError::HttpError {
            status: 429,
            body: "rate limited".into()
        }));
        assert!(InferenceClient::is_retriable(&InferenceError::HttpError {
            status: 503,
            body: "".into()
        }));
        assert!(!InferenceClient::is_retriable(&InferenceError::HttpError {
            status: 401,
            body: "invalid api key".into()
        }));
        assert!(!InferenceClient::is_retriable(&InferenceError::ResponseParseError {
            reason: "".into()
        }));
    }

    #[test]
    fn test_try_repair_from_error_with_single_tool() {
        let err = InferenceError::HttpError {
            status: 500,
            body: r#"{"error":{"message":"error parsing tool call: raw='{\"query\":\"\"nhà Quận 7\",\"top_k\":3,}', err=invalid character"}}"#.to_string(),
        };
        let tools = vec![search_tool()];
        let repaired = InferenceClient::try_repair_from_error(&err, Some(tools.as_slice())).unwrap();
        assert_eq!(repaired.tool_calls.len(), 1);
        assert_eq!(repaired.tool_calls[0].name, "search_docs");
        assert_eq!(repaired.tool_calls[0].arguments["query"], "nhà Quận 7");
        assert_eq!(repaired.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_try_repair_from_error_needs_exactly_one_tool() {
        let err = InferenceError::HttpError {
            status: 500,
            body: r#"{"error":{"message":"error parsing tool call: raw='{}', err=x"}}"#.to_string(),
        };
        assert!(InferenceClient::try_repair_from_error(&err, None).is_none());
        let two = vec![search_tool(), search_tool()];
        assert!(InferenceClient::try_repair_from_error(&err, Some(two.as_slice())).is_none());
    }

    #[tokio::test]
    async fn test_chat_completion_parses_reply() {
        let url = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"Chào bạn"},"finish_reason":"stop"}]}"#.to_string(),
        )
        .await;
        let client = InferenceClient::from_config(&test_config(&url, "http://127.0.0.1:1/v1")).unwrap();
        let reply = client.complete(user("xin chào"), None).await.unwrap();
        assert_eq!(reply.content, "Chào bạn");
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_unreachable() {
        let fallback = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"content":"from b"}}]}"#.to_string(),
        )
        .await;
        let client =
            InferenceClient::from_config(&test_config("http://127.0.0.1:1/v1", &fallback)).unwrap();
        let reply = client.complete(user("hi"), None).await.unwrap();
        assert_eq!(reply.content, "from b");
    }

    #[tokio::test]
    async fn test_tool_rejection_is_not_failed_over() {
        let primary = serve_once(
            "400 Bad Request",
            r#"{"error":{"message":"Failed to call a function. Please adjust your prompt.","code":"tool_use_failed"}}"#.to_string(),
        )
        .await;
        let client =
            InferenceClient::from_config(&test_config(&primary, "http://127.0.0.1:1/v1")).unwrap();
        let err = client
            .complete(user("hi"), Some(vec![search_tool()]))
            .await
            .unwrap_err();
        assert!(err.is_tool_request_rejected());
    }

    #[tokio::test]
    async fn test_all_models_unavailable() {
        let client = InferenceClient::from_config(&test_config(
            "http://127.0.0.1:1/v1",
            "http://127.0.0.1:2/v1",
        ))
        .unwrap();
        let err = client.complete(user("hi"), None).await.unwrap_err();
        match err {
            InferenceError::AllModelsUnavailable { attempted } => {
                assert_eq!(attempted, vec!["model-a", "model-b"]);
            }
            other => panic!("expected AllModelsUnavailable, got {other:?}"),
        }
    }
}
