//! # Handoffs
//!
//! A handoff lets one agent pass the conversation to another. The model sees
//! each handoff as a parameterless tool named `transfer_to_<agent>`; when it
//! calls one, the runner switches the active agent instead of executing
//! anything, and the next turn is answered by the target with its own system
//! message.
//!
//! ```rust
//! use panacloud_agents::{Agent, Handoff};
//! use std::sync::Arc;
//!
//! let web = Arc::new(
//!     Agent::new("Web Dev Agent", "You are responsible for answering questions about Website Development.")
//!         .with_handoff_description("Answer questions about website development."),
//! );
//! let handoff = Handoff::new(web);
//!
//! assert_eq!(handoff.tool_name, "transfer_to_web_dev_agent");
//! assert_eq!(
//!     handoff.tool_description,
//!     "Handoff to the Web Dev Agent agent to handle the request. Answer questions about website development."
//! );
//! ```

use serde_json::Value;
use std::sync::Arc;

use crate::agent::Agent;
use crate::model::ToolSpec;
use crate::tool::function_style;

/// A potential handoff target of an agent.
#[derive(Clone)]
pub struct Handoff {
    /// Name the model calls to trigger the handoff.
    pub tool_name: String,

    /// Description advertised alongside the tool name.
    pub tool_description: String,

    /// The agent that takes over.
    pub agent: Arc<Agent>,
}

impl Handoff {
    /// Creates a handoff to `agent`, deriving the tool name and description
    /// from the agent's name and handoff description.
    pub fn new(agent: Arc<Agent>) -> Self {
        let tool_name = Self::default_tool_name(&agent);
        let tool_description = Self::default_tool_description(&agent);
        Self {
            tool_name,
            tool_description,
            agent,
        }
    }

    /// Creates a handoff with a caller-chosen tool name and description.
    pub fn with_name(
        agent: Arc<Agent>,
        tool_name: impl Into<String>,
        tool_description: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_description: tool_description.into(),
            agent,
        }
    }

    pub fn default_tool_name(agent: &Agent) -> String {
        format!("transfer_to_{}", function_style(agent.name()))
    }

    pub fn default_tool_description(agent: &Agent) -> String {
        let mut description = format!(
            "Handoff to the {} agent to handle the request.",
            agent.name()
        );
        if let Some(extra) = agent.handoff_description() {
            description.push(' ');
            description.push_str(extra);
        }
        description
    }

    /// Returns a reference to the target `Agent`.
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Tool declaration advertised to the model. Handoffs take no arguments.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.tool_name.clone(),
            description: self.tool_description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }

    /// Payload of the tool message that answers a handoff call.
    pub fn ack(&self) -> Value {
        serde_json::json!({ "assistant": self.agent.name(), "ack": true })
    }
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handoff")
            .field("tool_name", &self.tool_name)
            .field("agent", &self.agent.name())
            .finish()
    }
}
