//! HTTP/SSE chat server for the Panacloud agents.

use std::sync::Arc;
use std::time::Duration;

use panacloud_agents::server::{self, AppState};
use panacloud_agents::{logging, AgentRegistry, AppConfig, ChatApp, ChatOptions};

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

    let state = AppState::new(app)
        .with_idle_timeout(Duration::from_secs(config.server.session_idle_secs));
    server::serve(Arc::new(state), &config.server.bind).await?;
    Ok(())
}
