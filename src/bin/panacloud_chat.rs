//! Terminal chat with the Panacloud agents.
//!
//! Reads one message per line from stdin. `/exit` or end of input quits.

use std::io::Write;
use std::sync::Arc;

use panacloud_agents::{
    logging, AgentRegistry, AppConfig, ChatApp, ChatOptions, TerminalSurface,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logging::init();

    let config = AppConfig::load(None)?;
    let model = config.model_handle()?;
    let registry = Arc::new(AgentRegistry::panacloud(model.clone()));
    let app = ChatApp::new(
        registry,
        config.run_config(model),
        ChatOptions::from(&config.chat),
    );

    let surface = TerminalSurface::new(std::io::stdout());
    let mut session = app.on_chat_start();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text == "/exit" {
            break;
        }
        if text.is_empty() {
            continue;
        }

        if let Err(e) = app.on_message(&mut session, text, &surface).await {
            warn!(error = %e, "Message failed");
            eprintln!("error: {}", e);
        }
    }

    app.on_chat_end(session);
    Ok(())
}
