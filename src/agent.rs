//! # Agent
//!
//! An `Agent` is a named bundle of instructions, a model handle, tools and
//! handoff targets. Agents are built once and shared behind `Arc`; nothing in
//! a run mutates them.

use std::sync::Arc;

use crate::handoff::Handoff;
use crate::items::Message;
use crate::model::{ModelProvider, ToolSpec};
use crate::tool::{AgentTool, Tool};

/// Defines the complete configuration for an [`Agent`].
#[derive(Clone)]
pub struct AgentConfig {
    /// The name of the agent, used for identification, handoff tool names
    /// and logs.
    pub name: String,

    /// The system instructions that guide the agent's behavior.
    pub instructions: String,

    /// A description of the agent's capabilities, appended to the handoff
    /// tool description when this agent is a handoff target.
    pub handoff_description: Option<String>,

    /// Model used when the run configuration does not override it.
    pub model: Option<Arc<dyn ModelProvider>>,

    /// Tools the agent can call.
    pub tools: Vec<Arc<dyn Tool>>,

    /// Agents this agent can hand the conversation to.
    pub handoffs: Vec<Handoff>,

    /// Sampling temperature. `None` leaves it to the provider.
    pub temperature: Option<f32>,

    /// The maximum number of tokens to generate in a single response.
    pub max_tokens: Option<u32>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            handoff_description: None,
            model: None,
            tools: Vec::new(),
            handoffs: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// An agent that can answer, call tools and hand off to other agents.
///
/// ## Example
///
/// ```rust
/// use panacloud_agents::Agent;
/// use std::sync::Arc;
///
/// let backend = Agent::new("Backend Developer", "You are a Backend Developer expert.");
/// let agentic = Agent::new("Agentic AI Agent", "You answer Agentic AI questions.")
///     .with_tool(Arc::new(backend.as_tool(
///         "Backend Developer",
///         "You are a Backend Developer expert.",
///     )))
///     .with_temperature(0.3);
///
/// assert_eq!(agentic.tools().len(), 1);
/// assert_eq!(agentic.tools()[0].name(), "backend_developer");
/// assert_eq!(agentic.config.temperature, Some(0.3));
/// ```
#[derive(Clone)]
pub struct Agent {
    /// The configuration that defines the agent's behavior and capabilities.
    pub config: AgentConfig,
}

impl Agent {
    /// Creates an agent with just a name and instructions.
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self::from_config(AgentConfig::new(name, instructions))
    }

    pub fn from_config(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn with_model(mut self, model: Arc<dyn ModelProvider>) -> Self {
        self.config.model = Some(model);
        self
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.config.handoff_description = Some(description.into());
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.config.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.config.tools.extend(tools);
        self
    }

    pub fn with_handoff(mut self, handoff: Handoff) -> Self {
        self.config.handoffs.push(handoff);
        self
    }

    pub fn with_handoffs(mut self, handoffs: Vec<Handoff>) -> Self {
        self.config.handoffs.extend(handoffs);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    /// Wraps a copy of this agent as a tool another agent can call.
    ///
    /// The caller keeps control of the conversation; see [`AgentTool`].
    pub fn as_tool(
        &self,
        tool_name: impl Into<String>,
        tool_description: impl Into<String>,
    ) -> AgentTool {
        AgentTool::new(Arc::new(self.clone()), tool_name, tool_description)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn instructions(&self) -> &str {
        &self.config.instructions
    }

    pub fn handoff_description(&self) -> Option<&str> {
        self.config.handoff_description.as_deref()
    }

    pub fn model(&self) -> Option<&Arc<dyn ModelProvider>> {
        self.config.model.as_ref()
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.config.tools
    }

    pub fn handoffs(&self) -> &[Handoff] {
        &self.config.handoffs
    }

    pub fn has_tools(&self) -> bool {
        !self.config.tools.is_empty()
    }

    pub fn has_handoffs(&self) -> bool {
        !self.config.handoffs.is_empty()
    }

    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.config.tools.iter().find(|t| t.name() == name)
    }

    pub fn find_handoff(&self, tool_name: &str) -> Option<&Handoff> {
        self.config
            .handoffs
            .iter()
            .find(|h| h.tool_name == tool_name)
    }

    /// Tool declarations sent to the model: regular tools first, then one
    /// `transfer_to_*` entry per handoff.
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.config
            .tools
            .iter()
            .map(|t| t.spec())
            .chain(self.config.handoffs.iter().map(Handoff::spec))
            .collect()
    }

    /// Constructs the system message for the agent.
    ///
    /// The instructions come first, followed by the available tools and the
    /// handoff targets so the model knows what it may delegate.
    pub fn build_system_message(&self) -> Message {
        let mut content = self.config.instructions.clone();

        if !self.config.tools.is_empty() {
            content.push_str("\n\nYou have access to the following tools:\n");
            for tool in &self.config.tools {
                content.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
            }
        }

        if !self.config.handoffs.is_empty() {
            content.push_str("\n\nYou can hand off to the following agents:\n");
            for handoff in &self.config.handoffs {
                content.push_str(&format!(
                    "- {}: {}\n",
                    handoff.tool_name, handoff.tool_description
                ));
            }
        }

        Message::system(content)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("model", &self.config.model.as_ref().map(|m| m.model_name()))
            .field("tools_count", &self.config.tools.len())
            .field("handoffs_count", &self.config.handoffs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::Role;
    use crate::model::ScriptedProvider;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_agent_creation() {
        let agent = Agent::new("TestAgent", "You are a test agent");
        assert_eq!(agent.name(), "TestAgent");
        assert_eq!(agent.instructions(), "You are a test agent");
        assert!(agent.model().is_none());
        assert!(agent.handoff_description().is_none());
        assert!(!agent.has_tools());
        assert!(!agent.has_handoffs());
    }

    #[test]
    fn test_agent_builder() {
        let model: Arc<dyn ModelProvider> = Arc::new(ScriptedProvider::new("gemini-2.0-flash"));
        let helper = Agent::new("Helper", "Helps");

        let agent = Agent::new("Builder", "Test instructions")
            .with_model(model)
            .with_handoff_description("Builds things")
            .with_temperature(0.5)
            .with_max_tokens(1000)
            .with_tools(vec![Arc::new(helper.as_tool("Helper", "Helps"))]);

        assert_eq!(agent.model().map(|m| m.model_name()), Some("gemini-2.0-flash"));
        assert_eq!(agent.handoff_description(), Some("Builds things"));
        assert_eq!(agent.config.temperature, Some(0.5));
        assert_eq!(agent.config.max_tokens, Some(1000));
        assert!(agent.find_tool("helper").is_some());
        assert!(agent.find_tool("Helper").is_none());
        assert!(format!("{:?}", agent).contains("tools_count: 1"));
    }

    #[test]
    fn test_tool_specs_list_tools_before_handoffs() {
        let web = Arc::new(Agent::new("Web Dev Agent", "Web"));
        let dev = Agent::new("DevOps Engineer", "You are a DevOps Engineer expert.");

        let agent = Agent::new("Main", "Route")
            .with_handoff(Handoff::new(web))
            .with_tool(Arc::new(dev.as_tool("DevOps Engineer", "Ops")));

        let names: Vec<String> = agent.tool_specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["devops_engineer", "transfer_to_web_dev_agent"]);
        assert!(agent.find_handoff("transfer_to_web_dev_agent").is_some());
    }

    #[test]
    fn test_system_message_lists_capabilities() {
        let mobile = Arc::new(
            Agent::new("Mobile Application Development Agent", "Mobile")
                .with_handoff_description("Answer questions about Mobile App development."),
        );
        let agent = Agent::new("Main", "Reply to user queries.").with_handoff(Handoff::new(mobile));

        let msg = agent.build_system_message();
        assert_eq!(msg.role, Role::System);
        assert!(msg.content.starts_with("Reply to user queries."));
        assert!(msg.content.contains("You can hand off to the following agents:"));
        assert!(msg
            .content
            .contains("- transfer_to_mobile_application_development_agent: Handoff to the"));
        assert!(!msg.content.contains("following tools"));
    }
}
