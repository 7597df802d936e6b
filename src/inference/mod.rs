//! Language model gateway: an OpenAI-compatible chat-completions client.
//!
//! - Request/response wire types
//! - Response normalization and tool-call argument repair
//! - Model failover along the configured fallback chain
//! - Configuration loading from `config/rag.yaml`
//!
//! Groq, OpenAI and Ollama all speak the same API, so switching provider is a
//! config change, not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod response;
pub mod tool_call_parser;
pub mod types;

pub use client::{ChatGateway, InferenceClient};
pub use config::{AppConfig, ModelConfig, Provider};
pub use errors::InferenceError;
pub use types::{ChatMessage, CompletionMessage, Role, ToolCall, ToolDefinition};
