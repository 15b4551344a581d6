//! The fixed Panacloud agent graph.
//!
//! ```text
//! Panacloud Assistant
//!  ├─ handoff → Web Dev Agent
//!  ├─ handoff → Mobile Application Development Agent
//!  └─ handoff → Agentic AI Agent
//!                ├─ tool → Backend Developer
//!                └─ tool → DevOps Engineer
//! ```
//!
//! Every agent shares one model handle. The graph is built once at startup
//! and never changes afterwards.

use std::sync::Arc;
use tracing::debug;

use crate::agent::Agent;
use crate::handoff::Handoff;
use crate::model::ModelProvider;

pub const ENTRY_AGENT: &str = "Panacloud Assistant";
pub const WEB_DEV_AGENT: &str = "Web Dev Agent";
pub const MOBILE_DEV_AGENT: &str = "Mobile Application Development Agent";
pub const AGENTIC_AI_AGENT: &str = "Agentic AI Agent";
pub const BACKEND_DEVELOPER: &str = "Backend Developer";
pub const DEVOPS_ENGINEER: &str = "DevOps Engineer";

const ENTRY_INSTRUCTIONS: &str =
    "Reply to user queries according to the prompt and hand off to other agents if needed.";
const WEB_DEV_INSTRUCTIONS: &str =
    "You are responsible for answering questions about Website Development.";
const MOBILE_DEV_INSTRUCTIONS: &str = "You are responsible for answering questions about Mobile Application Development at Panaversity, a global university for Agentic AI.";
const AGENTIC_AI_INSTRUCTIONS: &str =
    "You are responsible for answering questions about Agentic AI development at Panaversity.";
const BACKEND_INSTRUCTIONS: &str = "You are a Backend Developer expert.";
const DEVOPS_INSTRUCTIONS: &str = "You are a DevOps Engineer expert.";

/// Owns every configured agent.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    entry: Arc<Agent>,
    agents: Vec<Arc<Agent>>,
}

impl AgentRegistry {
    /// Builds the Panacloud agents on top of `model`.
    pub fn panacloud(model: Arc<dyn ModelProvider>) -> Self {
        let backend = Arc::new(
            Agent::new(BACKEND_DEVELOPER, BACKEND_INSTRUCTIONS).with_model(model.clone()),
        );
        let devops = Arc::new(
            Agent::new(DEVOPS_ENGINEER, DEVOPS_INSTRUCTIONS).with_model(model.clone()),
        );

        let web = Arc::new(
            Agent::new(WEB_DEV_AGENT, WEB_DEV_INSTRUCTIONS)
                .with_model(model.clone())
                .with_handoff_description("Answer questions about website development."),
        );
        let mobile = Arc::new(
            Agent::new(MOBILE_DEV_AGENT, MOBILE_DEV_INSTRUCTIONS)
                .with_model(model.clone())
                .with_handoff_description("Answer questions about Mobile App development."),
        );
        let agentic = Arc::new(
            Agent::new(AGENTIC_AI_AGENT, AGENTIC_AI_INSTRUCTIONS)
                .with_model(model.clone())
                .with_handoff_description("Answer questions about Agentic AI development.")
                .with_tools(vec![
                    Arc::new(backend.as_tool(BACKEND_DEVELOPER, BACKEND_INSTRUCTIONS)),
                    Arc::new(devops.as_tool(DEVOPS_ENGINEER, DEVOPS_INSTRUCTIONS)),
                ]),
        );

        let entry = Arc::new(
            Agent::new(ENTRY_AGENT, ENTRY_INSTRUCTIONS)
                .with_model(model)
                .with_handoffs(vec![
                    Handoff::new(web.clone()),
                    Handoff::new(mobile.clone()),
                    Handoff::new(agentic.clone()),
                ]),
        );

        let agents = vec![entry.clone(), web, mobile, agentic, backend, devops];
        debug!(agents = agents.len(), entry = ENTRY_AGENT, "Agent registry built");
        Self { entry, agents }
    }

    /// The agent every conversation starts with.
    pub fn entry(&self) -> &Arc<Agent> {
        &self.entry
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Agent>> {
        self.agents.iter().find(|a| a.name() == name)
    }

    /// Agent names, entry agent first.
    pub fn names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
