//! Application configuration loading and validation.
//!
//! Reads `config/rag.yaml` and resolves environment variables, so API keys
//! never have to live in the file. Config is the single source of truth for
//! model endpoints, the retriever backend, history limits and storage paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::InferenceError;

/// Relative location of the config file inside a project root.
const CONFIG_RELATIVE_PATH: &str = "config/rag.yaml";

/// Env var pointing directly at a config file.
pub const CONFIG_ENV_VAR: &str = "REALESTATE_RAG_CONFIG";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Hosted or local chat-completion provider. All speak the OpenAI dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Groq,
    #[serde(alias = "openai")]
    OpenAi,
    Ollama,
}

impl Provider {
    /// Default base URL when a model entry leaves `base_url` out.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }
}

/// A single model's runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub display_name: String,
    pub provider: Provider,
    pub model_name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Bearer token. Empty means no `Authorization` header (local Ollama).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ModelConfig {
    /// Resolved endpoint root, without a trailing slash.
    pub fn endpoint(&self) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// API key, if one is configured and non-empty.
    pub fn bearer_token(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_timeout_secs() -> u64 {
    60
}

/// Vector store and embedding endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default = "default_chroma_url")]
    pub chroma_url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// OpenAI-compatible root serving `POST /embeddings`.
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub embedding_api_key: Option<String>,
    #[serde(default = "default_top_k")]
    pub default_top_k: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            chroma_url: default_chroma_url(),
            collection: default_collection(),
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            embedding_api_key: None,
            default_top_k: default_top_k(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_chroma_url() -> String {
    "http://localhost:8000".into()
}
fn default_collection() -> String {
    "real_estate".into()
}
fn default_embedding_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}
fn default_top_k() -> u32 {
    3
}

/// Chat history bounds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HistoryConfig {
    /// Turns kept verbatim; older ones are folded into a summary.
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            keep_last: default_keep_last(),
        }
    }
}

fn default_keep_last() -> usize {
    5
}

/// Top-level configuration (mirrors `config/rag.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub active_model: String,
    pub models: HashMap<String, ModelConfig>,
    /// Model key used for history summaries. Defaults to `active_model`.
    #[serde(default)]
    pub summarizer_model: Option<String>,
    /// Model keys tried in order when the current one is unreachable.
    #[serde(default)]
    pub fallback_chain: Vec<String>,
    #[serde(default)]
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    /// SQLite file for chat history. Defaults to `<data_dir>/chat_history.db`.
    #[serde(default)]
    pub database_path: Option<String>,
}

impl AppConfig {
    /// Key of the model that writes history summaries.
    pub fn summarizer_model_key(&self) -> &str {
        self.summarizer_model
            .as_deref()
            .filter(|k| !k.is_empty())
            .unwrap_or(&self.active_model)
    }

    /// Check cross-references that serde cannot express.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if !self.models.contains_key(&self.active_model) {
            return Err(InferenceError::ConfigError {
                reason: format!("active model '{}' not found in models", self.active_model),
            });
        }
        let summarizer = self.summarizer_model_key();
        if !self.models.contains_key(summarizer) {
            return Err(InferenceError::ConfigError {
                reason: format!("summarizer model '{summarizer}' not found in models"),
            });
        }
        if self.retriever.default_top_k == 0 {
            return Err(InferenceError::ConfigError {
                reason: "retriever.default_top_k must be positive".into(),
            });
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate `config/rag.yaml`.
///
/// `REALESTATE_RAG_CONFIG` wins when it points at an existing file; otherwise
/// searches upward from `start`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, InferenceError> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.is_file() {
            return Ok(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} does not point at a file");
    }

    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_RELATIVE_PATH))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| InferenceError::ConfigError {
            reason: format!("could not find {CONFIG_RELATIVE_PATH}"),
        })
}

/// Load, interpolate, parse and validate the configuration file.
pub fn load_config(path: &Path) -> Result<AppConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_config(&raw)
}

/// Parse configuration text. Performs `${VAR}` / `${VAR:-default}`
/// interpolation first.
pub fn parse_config(raw: &str) -> Result<AppConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);
    let config: AppConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;
    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string. An unterminated
/// `${` is copied through untouched.
fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&resolve_var_expr(&after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Resolve `VAR` or `VAR:-default`. Unset variables without a default
/// resolve to the empty string.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name.trim())
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => std::env::var(expr.trim()).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
        _ => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
active_model: groq-llama
models:
  groq-llama:
    display_name: "Llama 3.3 70B (Groq)"
    provider: groq
    model_name: llama-3.3-70b-versatile
    api_key: "${__RAG_TEST_UNSET_KEY__:-sk-test}"
  local:
    display_name: "Qwen (Ollama)"
    provider: ollama
    model_name: "qwen2.5:7b"
    temperature: 0.2
fallback_chain: [groq-llama, local]
"#;

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__RAG_TEST_NONEXISTENT_VAR__");
        let result = interpolate_env_vars("${__RAG_TEST_NONEXISTENT_VAR__:-/fallback/path}");
        assert_eq!(result, "/fallback/path");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__RAG_TEST_CONFIG_VAR__", "/custom/path");
        let result = interpolate_env_vars("root: ${__RAG_TEST_CONFIG_VAR__:-/fallback/path}/db");
        assert_eq!(result, "root: /custom/path/db");
        std::env::remove_var("__RAG_TEST_CONFIG_VAR__");
    }

    #[test]
    fn test_interpolate_unset_without_default_is_empty() {
        std::env::remove_var("__RAG_TEST_EMPTY_VAR__");
        assert_eq!(interpolate_env_vars("key=${__RAG_TEST_EMPTY_VAR__};"), "key=;");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_interpolate_unterminated_is_kept() {
        assert_eq!(interpolate_env_vars("a ${OPEN"), "a ${OPEN");
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/rag/chat.db");
        assert!(!result.starts_with('~'), "tilde should be expanded");
        assert!(result.ends_with("/rag/chat.db"));
    }

    #[test]
    fn test_parse_sample_config() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.active_model, "groq-llama");
        assert_eq!(config.summarizer_model_key(), "groq-llama");
        assert_eq!(config.fallback_chain.len(), 2);
        assert_eq!(config.history.keep_last, 5);
        assert_eq!(config.retriever.default_top_k, 3);
        assert!(config.database_path.is_none());

        let groq = &config.models["groq-llama"];
        assert_eq!(groq.provider, Provider::Groq);
        assert_eq!(groq.bearer_token(), Some("sk-test"));
        assert_eq!(groq.endpoint(), "https://api.groq.com/openai/v1");
        assert_eq!(groq.max_tokens, 2048);

        let local = &config.models["local"];
        assert_eq!(local.provider, Provider::Ollama);
        assert!(local.bearer_token().is_none());
        assert!((local.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let yaml = r#"
active_model: m
models:
  m:
    display_name: M
    provider: openai
    model_name: gpt-4o-mini
    base_url: "https://proxy.local/v1/"
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.models["m"].endpoint(), "https://proxy.local/v1");
    }

    #[test]
    fn test_missing_active_model_is_error() {
        let yaml = r#"
active_model: nonexistent
models: {}
"#;
        assert!(matches!(
            parse_config(yaml),
            Err(InferenceError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_unknown_summarizer_model_is_error() {
        let yaml = format!("{SAMPLE}\nsummarizer_model: missing\n");
        assert!(parse_config(&yaml).is_err());
    }

    #[test]
    fn test_find_config_path_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join(CONFIG_RELATIVE_PATH), SAMPLE).unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_path(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_RELATIVE_PATH));
        assert!(load_config(&found).is_ok());
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = parse_config(include_str!("../../config/rag.yaml")).unwrap();
        assert_eq!(config.summarizer_model_key(), "groq-small");
        assert_eq!(config.models["openai"].provider, Provider::OpenAi);
        assert_eq!(config.history.keep_last, 5);
        assert!(config.fallback_chain.is_empty());
    }
}
