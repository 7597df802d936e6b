//! Console driver: one question per stdin line, one JSON response per line.
//!
//! Every line belongs to the same session, so follow-up questions see the
//! earlier exchange. Pass a session id as the first argument to resume one.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use realestate_rag::commands::chat::{ask, new_session_id, new_user_id, ChatRequest};
use realestate_rag::{data_dir, init_tracing, RagApp};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(&data_dir()).context("failed to initialise logging")?;

    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let app = RagApp::load(&cwd).context("failed to start")?;

    let session_id = std::env::args().nth(1).unwrap_or_else(new_session_id);
    let user_id = new_user_id();
    eprintln!("session {session_id}, type a question and press enter (Ctrl-D to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        let request = ChatRequest {
            user_input: question.to_string(),
            session_id: Some(session_id.clone()),
            user_id: Some(user_id.clone()),
        };
        match ask(&app, request).await {
            Ok(response) => {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                stdout.write_all(out.as_bytes()).await?;
                stdout.flush().await?;
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "request failed");
                eprintln!("error: {e}");
            }
        }
    }

    tracing::info!(session_id = %session_id, "input closed, shutting down");
    Ok(())
}
