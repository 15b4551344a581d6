//! Tool system for agents
//!
//! A tool is something the model may call by name with JSON arguments. In
//! the Panacloud wiring every tool is another agent wrapped with
//! [`Agent::as_tool`](crate::agent::Agent::as_tool); the trait stays open so
//! other tools can be plugged in the same way.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

use crate::agent::Agent;
use crate::error::Result;
use crate::model::ToolSpec;
use crate::runner::{RunConfig, Runner};
use crate::usage::UsageStats;

/// Result from a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output from the tool
    pub output: Value,
    /// Optional error message if the tool failed
    pub error: Option<String>,
    /// Model usage spent inside the tool, for tools that run an agent.
    #[serde(skip)]
    pub usage: Option<UsageStats>,
}

impl ToolResult {
    pub fn success(output: Value) -> Self {
        Self {
            output,
            error: None,
            usage: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: Value::Null,
            error: Some(message.into()),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: UsageStats) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Text sent back to the model in the tool message.
    pub fn render(&self) -> String {
        match (&self.error, &self.output) {
            (Some(error), _) => format!("Error: {}", error),
            (None, Value::String(s)) => s.clone(),
            (None, other) => other.to_string(),
        }
    }
}

/// What a tool gets to see of the run that called it.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Name of the agent that issued the call.
    pub agent: String,
    /// The calling run's configuration; nested agent runs reuse it.
    pub run_config: RunConfig,
}

/// Trait for all tools that can be used by agents
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    /// Name the model calls the tool by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the tool's arguments.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolResult>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Converts a display name into a function-call-safe identifier:
/// anything outside `[A-Za-z0-9_]` becomes `_`, then the result is lowercased.
///
/// ```
/// use panacloud_agents::tool::function_style;
/// assert_eq!(function_style("DevOps Engineer"), "devops_engineer");
/// ```
pub fn function_style(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Arguments accepted by an agent exposed as a tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AgentToolInput {
    /// The request to forward to the agent.
    pub input: String,
}

/// An agent wrapped as a callable tool.
///
/// Unlike a handoff, the calling agent stays in control: the wrapped agent
/// runs to completion on the tool input and its final output comes back as
/// the tool result.
#[derive(Clone)]
pub struct AgentTool {
    name: String,
    display_name: String,
    description: String,
    agent: Arc<Agent>,
}

impl AgentTool {
    pub fn new(
        agent: Arc<Agent>,
        tool_name: impl Into<String>,
        tool_description: impl Into<String>,
    ) -> Self {
        let display_name = tool_name.into();
        Self {
            name: function_style(&display_name),
            display_name,
            description: tool_description.into(),
            agent,
        }
    }

    /// The name the tool was registered under, before sanitising.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    fn input_text(arguments: &Value) -> String {
        match serde_json::from_value::<AgentToolInput>(arguments.clone()) {
            Ok(parsed) => parsed.input,
            Err(_) => match arguments {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        }
    }
}

impl Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .finish()
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        let schema = schemars::schema_for!(AgentToolInput);
        serde_json::to_value(schema.schema).unwrap_or_else(|_| {
            serde_json::json!({
                "type": "object",
                "properties": {"input": {"type": "string"}},
                "required": ["input"]
            })
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input = Self::input_text(&arguments);
        debug!(
            caller = %ctx.agent,
            tool = %self.name,
            agent = %self.agent.name(),
            "Running agent as tool"
        );
        let result = Runner::run(&self.agent, input, &ctx.run_config).await?;
        Ok(ToolResult::success(Value::String(result.final_output)).with_usage(result.usage))
    }
}
