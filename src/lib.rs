pub mod agent_core;
pub mod commands;
pub mod inference;
pub mod retrieval;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use agent_core::{
    AgentError, ConversationManager, HistorySummarizer, RagGenerator, SearchDocsTool, ToolRouter,
};
use inference::config::{expand_tilde, find_config_path, load_config};
use inference::{AppConfig, ChatGateway, InferenceClient, InferenceError};
use retrieval::{ChromaRetriever, RetrievalError, Retriever};

/// File name of the chat history database inside the data directory.
const DB_FILE_NAME: &str = "chat_history.db";

/// Return the platform-standard data directory for the assistant.
///
/// - macOS: `~/Library/Application Support/realestate-rag/`
/// - Windows: `{FOLDERID_RoamingAppData}\realestate-rag\`
/// - Linux: `$XDG_DATA_HOME/realestate-rag/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.realestate-rag/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("realestate-rag");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".realestate-rag")
}

// ─── Logging ────────────────────────────────────────────────────────────────

/// Initialize the tracing subscriber, writing to `<log_dir>/rag.log`.
///
/// On each startup:
/// 1. Rotates existing logs (rag.log → rag.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh rag.log with a line-flushing writer.
/// 3. Logs a startup banner with the data directory path.
///
/// `RUST_LOG` overrides the default `realestate_rag=info,warn` filter.
pub fn init_tracing(log_dir: &Path) -> std::io::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join("rag.log");

    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("realestate_rag=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .map_err(|e| std::io::Error::other(format!("tracing already initialised: {e}")))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== realestate-rag starting ==="
    );
    Ok(())
}

/// Rotate log files: `rag.log` → `rag.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write, so a
/// crash never loses the last log lines.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ─── Bootstrap ──────────────────────────────────────────────────────────────

/// Failure while wiring the application together.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] InferenceError),

    #[error(transparent)]
    Retriever(#[from] RetrievalError),

    #[error(transparent)]
    Store(#[from] AgentError),
}

/// Resolve the SQLite path: the configured one (with `~` expanded) or
/// `<data_dir>/chat_history.db`.
fn resolve_db_path(config: &AppConfig) -> String {
    if let Some(path) = config.database_path.as_deref().filter(|p| !p.trim().is_empty()) {
        return expand_tilde(path);
    }
    let dir = data_dir();
    if !dir.exists() {
        let _ = std::fs::create_dir_all(&dir);
    }
    dir.join(DB_FILE_NAME).to_string_lossy().into_owned()
}

/// Everything one process needs to answer questions.
pub struct RagApp {
    pub config: AppConfig,
    pub generator: RagGenerator,
    pub conversations: Arc<ConversationManager>,
}

impl RagApp {
    /// Find `config/rag.yaml` from `start` upward and build the app.
    pub fn load(start: &Path) -> Result<Self, StartupError> {
        let path = find_config_path(start)?;
        let config = load_config(&path)?;
        tracing::info!(config = %path.display(), active_model = %config.active_model, "config loaded");
        Self::from_config(config)
    }

    /// Build the real collaborators (HTTP gateway, Chroma, SQLite) from config.
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let gateway = InferenceClient::from_config(&config)?;
        let summarizer_gateway =
            InferenceClient::from_config_with_model(&config, config.summarizer_model_key())?;
        let retriever = ChromaRetriever::from_config(&config.retriever)?;

        let db_path = resolve_db_path(&config);
        let conversations = ConversationManager::open(&db_path)?;

        tracing::info!(
            model = gateway.current_model_name(),
            summarizer = summarizer_gateway.current_model_name(),
            collection = %config.retriever.collection,
            db_path = %db_path,
            keep_last = config.history.keep_last,
            "application initialised"
        );

        Ok(Self::new(
            config,
            Arc::new(gateway),
            Arc::new(summarizer_gateway),
            Arc::new(retriever),
            Arc::new(conversations),
        ))
    }

    /// Assemble the app from already-built collaborators.
    pub fn new(
        config: AppConfig,
        gateway: Arc<dyn ChatGateway>,
        summarizer_gateway: Arc<dyn ChatGateway>,
        retriever: Arc<dyn Retriever>,
        conversations: Arc<ConversationManager>,
    ) -> Self {
        let router = ToolRouter::new().with_tool(Arc::new(SearchDocsTool::new(
            retriever,
            config.retriever.default_top_k,
        )));
        let summarizer = HistorySummarizer::new(summarizer_gateway, config.history.keep_last);
        let generator = RagGenerator::new(gateway, Arc::new(router), conversations.clone())
            .with_summarizer(summarizer);

        Self {
            config,
            generator,
            conversations,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
