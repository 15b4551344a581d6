//! # Panacloud agents
//!
//! A chat front end for a small multi-agent setup. A triage agent, the
//! *Panacloud Assistant*, answers questions and hands off to three
//! specialists (web, mobile and Agentic AI development). The Agentic AI
//! specialist can in turn consult a Backend Developer and a DevOps Engineer
//! agent as tools.
//!
//! The crate carries the whole path from a chat message to a model call:
//!
//! - [`registry`]: the fixed agent graph
//! - [`chat`]: message handlers and chat surfaces (terminal, recorder)
//! - [`server`]: the same handlers over HTTP with server-sent events
//! - [`runner`]: the agent loop with handoffs, agents-as-tools and streaming
//! - [`provider`]: an OpenAI-compatible chat-completions model, pointed at
//!   Gemini by default
//! - [`config`]: defaults, TOML file and environment overrides
//!
//! ## Getting Started
//!
//! Set `GEMINI_API_KEY` (a `.env` file works too).
//!
//! ```rust,no_run
//! use panacloud_agents::{AgentRegistry, AppConfig, Runner};
//!
//! # async fn example() -> panacloud_agents::Result<()> {
//! let config = AppConfig::load(None)?;
//! let model = config.model_handle()?;
//! let registry = AgentRegistry::panacloud(model.clone());
//!
//! let result = Runner::run(
//!     registry.entry(),
//!     "How many handoffs do you have?",
//!     &config.run_config(model),
//! )
//! .await?;
//! println!("{}", result.final_output);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod handoff;
pub mod items;
pub mod logging;
pub mod model;
pub mod provider;
pub mod registry;
pub mod result;
pub mod runner;
pub mod server;
pub mod session;
pub mod tool;
pub mod trace;
pub mod usage;

// Public re-exports for convenience
pub use agent::{Agent, AgentConfig};
pub use chat::{ChatApp, ChatOptions, ChatSession, ChatSurface, TerminalSurface, UiMessage};
pub use config::AppConfig;
pub use error::{AgentsError, Result};
pub use handoff::Handoff;
pub use items::{Message, Role, RunItem};
pub use model::{ModelProvider, ScriptedProvider};
pub use provider::ChatCompletionsModel;
pub use registry::AgentRegistry;
pub use result::{RunResult, RunResultStreaming, StreamEvent};
pub use runner::{RunConfig, RunInput, Runner};
pub use session::ConversationHistory;
pub use tool::{AgentTool, Tool, ToolResult};
pub use usage::{Usage, UsageStats};
