//! One-shot demo: asks the Panacloud Assistant about its own wiring and
//! prints the answer.

use panacloud_agents::{logging, AgentRegistry, AppConfig, Runner};
use tracing::info;

const PROMPT: &str =
    "How many handoffs do you have? Also tell Which Agent Have Agents As A Tool name it also";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logging::init();

    let config = AppConfig::load(None)?;
    let model = config.model_handle()?;
    let registry = AgentRegistry::panacloud(model.clone());

    let result = Runner::run(registry.entry(), PROMPT, &config.run_config(model)).await?;
    info!(
        last_agent = %result.last_agent,
        total_tokens = result.usage.total.total_tokens,
        "Run finished"
    );
    println!("{}", result.final_output);
    Ok(())
}
