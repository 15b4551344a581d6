//! # Runner
//!
//! The `Runner` drives an agent run: it asks the model for a turn, routes
//! tool calls, follows handoffs and keeps the run record. One turn is one
//! model call. A reply without tool calls ends the run.
//!
//! Handoffs short-circuit the turn: the first `transfer_to_*` call is acted
//! on, the active agent changes and the next turn is answered with the new
//! agent's system message. Tool failures never abort the run; they are fed
//! back to the model as `Error: ...` tool messages.

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::error::{AgentsError, Result};
use crate::items::{Message, Role, RunItem, ToolCall};
use crate::model::{collect_stream, ModelProvider, ModelRequest};
use crate::result::{RunResult, RunResultStreaming, StreamEvent};
use crate::tool::{ToolContext, ToolResult};
use crate::trace::{SpanKind, TraceRecorder};
use crate::usage::UsageStats;

fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => {
            let mut out = s[..idx].to_string();
            out.push('…');
            out
        }
        None => s.to_string(),
    }
}

fn format_messages_for_log(messages: &[Message]) -> String {
    let mut lines = Vec::new();
    for (idx, m) in messages.iter().enumerate() {
        match m.role {
            Role::User => {
                lines.push(format!(
                    "{:02} USER     | {}",
                    idx,
                    truncate_for_log(&m.content, 160)
                ));
            }
            Role::System => {
                lines.push(format!(
                    "{:02} SYSTEM   | {}",
                    idx,
                    truncate_for_log(&m.content, 160)
                ));
            }
            Role::Assistant => match &m.tool_calls {
                Some(tool_calls) => {
                    let calls: Vec<String> = tool_calls
                        .iter()
                        .map(|tc| format!("id={}, name={}", tc.id, tc.name))
                        .collect();
                    lines.push(format!(
                        "{:02} ASSIST   | tool_calls=[{}] content=\"{}\"",
                        idx,
                        calls.join(", "),
                        truncate_for_log(&m.content, 120)
                    ));
                }
                None => {
                    lines.push(format!(
                        "{:02} ASSIST   | {}",
                        idx,
                        truncate_for_log(&m.content, 160)
                    ));
                }
            },
            Role::Tool => {
                let tcid = m
                    .tool_call_id
                    .as_deref()
                    .unwrap_or("<missing tool_call_id>");
                lines.push(format!(
                    "{:02} TOOL     | tool_call_id={} payload={}",
                    idx,
                    tcid,
                    truncate_for_log(&m.content, 120)
                ));
            }
        }
    }
    lines.join("\n")
}

/// Run-level configuration.
///
/// A model set here overrides the model of every agent in the run,
/// including handoff targets and agents called as tools.
#[derive(Clone)]
pub struct RunConfig {
    pub model: Option<Arc<dyn ModelProvider>>,

    /// Upper bound on model calls in one run. Nested agent-tool runs get
    /// their own budget.
    pub max_turns: usize,

    /// When `true` (the default) no span record is kept.
    pub tracing_disabled: bool,

    /// Overrides the agent's temperature when set.
    pub temperature: Option<f32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_turns: 10,
            tracing_disabled: true,
            temperature: None,
        }
    }
}

impl RunConfig {
    pub fn with_model(mut self, model: Arc<dyn ModelProvider>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing_disabled = !enabled;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("model", &self.model.as_ref().map(|m| m.model_name()))
            .field("max_turns", &self.max_turns)
            .field("tracing_disabled", &self.tracing_disabled)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Input to a run: a single user message or a whole conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    Text(String),
    Messages(Vec<Message>),
}

impl RunInput {
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            RunInput::Text(text) => vec![Message::user(text)],
            RunInput::Messages(messages) => messages,
        }
    }
}

impl From<&str> for RunInput {
    fn from(text: &str) -> Self {
        RunInput::Text(text.to_string())
    }
}

impl From<String> for RunInput {
    fn from(text: String) -> Self {
        RunInput::Text(text)
    }
}

impl From<Vec<Message>> for RunInput {
    fn from(messages: Vec<Message>) -> Self {
        RunInput::Messages(messages)
    }
}

impl From<&[Message]> for RunInput {
    fn from(messages: &[Message]) -> Self {
        RunInput::Messages(messages.to_vec())
    }
}

/// Runs agents.
///
/// ```rust
/// use panacloud_agents::{Agent, RunConfig, Runner, ScriptedProvider};
/// use std::sync::Arc;
///
/// # async fn demo() -> panacloud_agents::Result<()> {
/// let model = Arc::new(ScriptedProvider::new("scripted").with_message("Hello!"));
/// let agent = Agent::new("Panacloud Assistant", "Reply to user queries.");
///
/// let result = Runner::run(&agent, "Hi", &RunConfig::default().with_model(model)).await?;
/// assert_eq!(result.final_output, "Hello!");
/// # Ok(())
/// # }
/// ```
pub struct Runner;

impl Runner {
    /// Runs `agent` on `input` until it produces a final output.
    pub async fn run(
        agent: &Agent,
        input: impl Into<RunInput>,
        config: &RunConfig,
    ) -> Result<RunResult> {
        Self::run_loop(agent.clone(), input.into(), config.clone(), None).await
    }

    /// Runs `agent` on a background task and streams its progress.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run_streamed(
        agent: Agent,
        input: impl Into<RunInput>,
        config: RunConfig,
    ) -> RunResultStreaming {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let input = input.into();

        tokio::spawn(async move {
            let outcome = Self::run_loop(agent, input, config, Some(&tx)).await;
            let terminal = match outcome {
                Ok(result) => StreamEvent::Completed {
                    result: Box::new(result),
                },
                Err(error) => StreamEvent::Failed { error },
            };
            if tx.send(terminal).is_err() {
                debug!("Stream receiver dropped before run finished");
            }
        });

        RunResultStreaming::new(rx)
    }

    fn resolve_model(agent: &Agent, config: &RunConfig) -> Result<Arc<dyn ModelProvider>> {
        config
            .model
            .clone()
            .or_else(|| agent.model().cloned())
            .ok_or_else(|| AgentsError::UserError {
                message: format!("No model configured for agent '{}'", agent.name()),
            })
    }

    fn emit(events: Option<&UnboundedSender<StreamEvent>>, event: StreamEvent) {
        if let Some(tx) = events {
            // A closed channel means the caller stopped listening.
            let _ = tx.send(event);
        }
    }

    async fn run_loop(
        agent: Agent,
        input: RunInput,
        config: RunConfig,
        events: Option<&UnboundedSender<StreamEvent>>,
    ) -> Result<RunResult> {
        let mut agent = Arc::new(agent);
        let mut history = input.into_messages();
        let mut items = Vec::new();
        let mut usage = UsageStats::new();
        let mut recorder = TraceRecorder::new(!config.tracing_disabled);
        let max_turns = config.max_turns;
        let mut turn = 0;

        info!(
            agent = %agent.name(),
            trace_id = %recorder.trace_id(),
            streamed = events.is_some(),
            "Starting run"
        );

        loop {
            turn += 1;
            if turn > max_turns {
                warn!(agent = %agent.name(), max_turns, "Max turns exceeded");
                return Err(AgentsError::MaxTurnsExceeded { max_turns });
            }

            debug!(turn, agent = %agent.name(), "Starting turn");
            let model = Self::resolve_model(&agent, &config)?;
            let agent_span = recorder.start_span(SpanKind::Agent {
                agent_name: agent.name().to_string(),
            });

            let mut messages = Vec::with_capacity(history.len() + 1);
            messages.push(agent.build_system_message());
            messages.extend(history.iter().cloned());

            debug!(
                target: "runner::messages",
                "\n=== Sending to provider (model: {}) ===\n{}\n=== end ===",
                model.model_name(),
                format_messages_for_log(&messages)
            );

            let request = ModelRequest {
                messages,
                tools: agent.tool_specs(),
                temperature: config.temperature.or(agent.config.temperature),
                max_tokens: agent.config.max_tokens,
            };

            let gen_span = recorder.start_span(SpanKind::Generation {
                model: model.model_name().to_string(),
                prompt_tokens: 0,
                completion_tokens: 0,
            });
            let outcome = match events {
                Some(tx) => match model.stream(request).await {
                    Ok(stream) => {
                        let name = agent.name().to_string();
                        collect_stream(stream, |delta| {
                            let _ = tx.send(StreamEvent::TextDelta {
                                agent: name.clone(),
                                delta: delta.to_string(),
                            });
                        })
                        .await
                    }
                    Err(e) => Err(e),
                },
                None => model.complete(request).await,
            };
            let (response, turn_usage) = match outcome {
                Ok(ok) => ok,
                Err(e) => {
                    recorder.fail_span(gen_span.as_deref(), e.to_string());
                    recorder.fail_span(agent_span.as_deref(), e.to_string());
                    return Err(e);
                }
            };
            recorder.end_generation(gen_span.as_deref(), &turn_usage);
            usage.record(agent.name(), turn_usage);

            if !response.has_tool_calls() {
                let final_output = response.text().to_string();
                items.push(RunItem::message(
                    agent.name(),
                    Role::Assistant,
                    final_output.clone(),
                ));
                recorder.end_span(agent_span.as_deref());
                info!(
                    agent = %agent.name(),
                    turns = turn,
                    total_tokens = usage.total.total_tokens,
                    "Run completed"
                );
                return Ok(RunResult {
                    final_output,
                    items,
                    last_agent: agent.name().to_string(),
                    usage,
                    trace: recorder.finish(),
                });
            }

            if !response.text().is_empty() {
                items.push(RunItem::message(
                    agent.name(),
                    Role::Assistant,
                    response.text(),
                ));
            }

            // Handoff short-circuit: only the first handoff call is answered.
            let handoff_call = response.tool_calls.iter().find_map(|call| {
                agent
                    .find_handoff(&call.name)
                    .map(|handoff| (call.clone(), handoff.clone()))
            });
            if let Some((call, handoff)) = handoff_call {
                let from = agent.name().to_string();
                let to = handoff.agent().name().to_string();
                info!(from = %from, to = %to, "Handoff");

                history.push(Message::assistant_with_tool_calls(
                    response.text(),
                    vec![call.clone()],
                ));
                items.push(RunItem::tool_call(&from, &call));
                items.push(RunItem::handoff(&from, &to));

                let span = recorder.start_span(SpanKind::Handoff {
                    from_agent: from.clone(),
                    to_agent: to.clone(),
                });
                recorder.end_span(span.as_deref());

                let ack = handoff.ack();
                history.push(Message::tool(ack.to_string(), &call.id));
                items.push(RunItem::tool_output(&call.id, ack, None));

                debug!(
                    target: "runner::messages",
                    "\n↳ Appended handoff TOOL reply (tool_call_id={})\n{}\n---",
                    call.id,
                    format_messages_for_log(&history)
                );

                recorder.end_span(agent_span.as_deref());
                agent = Arc::clone(&handoff.agent);
                Self::emit(events, StreamEvent::AgentUpdated { from, to });
                continue;
            }

            history.push(Message::assistant_with_tool_calls(
                response.text(),
                response.tool_calls.clone(),
            ));

            let ctx = ToolContext {
                agent: agent.name().to_string(),
                run_config: config.clone(),
            };
            for call in &response.tool_calls {
                items.push(RunItem::tool_call(agent.name(), call));
                Self::emit(
                    events,
                    StreamEvent::ToolCalled {
                        agent: agent.name().to_string(),
                        tool_name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                );

                let span = recorder.start_span(SpanKind::Tool {
                    tool_name: call.name.clone(),
                });
                let result = Self::execute_tool(&agent, call, &ctx).await;
                match &result.error {
                    Some(error) => recorder.fail_span(span.as_deref(), error.clone()),
                    None => recorder.end_span(span.as_deref()),
                }
                if let Some(nested) = &result.usage {
                    usage.merge(nested);
                }

                let rendered = result.render();
                history.push(Message::tool(rendered.clone(), &call.id));
                items.push(RunItem::tool_output(
                    &call.id,
                    result.output.clone(),
                    result.error.clone(),
                ));
                Self::emit(
                    events,
                    StreamEvent::ToolOutput {
                        tool_name: call.name.clone(),
                        output: rendered,
                        is_error: result.error.is_some(),
                    },
                );
            }

            debug!(
                target: "runner::messages",
                "\n↳ Appended {} TOOL replies\n{}\n---",
                response.tool_calls.len(),
                format_messages_for_log(&history)
            );
            recorder.end_span(agent_span.as_deref());
        }
    }

    /// Runs one tool call. Failures are folded into the result so the model
    /// can see them and recover.
    async fn execute_tool(agent: &Agent, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = agent.find_tool(&call.name) else {
            warn!(agent = %agent.name(), tool = %call.name, "Unknown tool");
            return ToolResult::error(format!("Unknown tool '{}'", call.name));
        };

        debug!(agent = %agent.name(), tool = %call.name, "Executing tool");
        match tool.execute(call.arguments.clone(), ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!(agent = %agent.name(), tool = %call.name, error = %e, "Tool failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}
