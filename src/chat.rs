//! Chat message handlers
//!
//! [`ChatApp`] wires a chat surface to the agent registry. A surface is
//! whatever shows messages to a person: the terminal, the SSE endpoint in
//! `server.rs`, or a recorder in tests. Handlers follow the same sequence on
//! every surface: send an empty reply, run the entry agent, relay tokens,
//! then finalize the reply.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ChatSettings;
use crate::error::{AgentsError, Result};
use crate::registry::AgentRegistry;
use crate::result::StreamEvent;
use crate::runner::{RunConfig, RunInput, Runner};
use crate::session::ConversationHistory;

/// A reply as shown on a chat surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiMessage {
    pub id: String,
    /// Name of the agent speaking. Changes when a handoff happens mid-reply.
    pub author: String,
    /// Everything relayed so far.
    pub content: String,
}

impl UiMessage {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            author: author.into(),
            content: String::new(),
        }
    }
}

/// The calls a chat UI offers to message handlers.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Shows a new (possibly empty) message.
    async fn send(&self, message: &UiMessage) -> Result<()>;

    /// Appends `token` to a message already sent. `message.content` already
    /// includes the token.
    async fn stream_token(&self, message: &UiMessage, token: &str) -> Result<()>;

    /// Finalizes a message.
    async fn update(&self, message: &UiMessage) -> Result<()>;
}

/// How replies are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatOptions {
    /// Relay text deltas as they arrive; otherwise relay the final output
    /// as a single token.
    pub streaming: bool,
    /// Run on the whole session history; otherwise on the latest message
    /// alone.
    pub track_history: bool,
}

impl ChatOptions {
    /// Stateless: each message is answered on its own, in one token.
    pub fn echo() -> Self {
        Self {
            streaming: false,
            track_history: false,
        }
    }

    /// Session history plus token streaming.
    pub fn session() -> Self {
        Self {
            streaming: true,
            track_history: true,
        }
    }
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self::session()
    }
}

impl From<&ChatSettings> for ChatOptions {
    fn from(settings: &ChatSettings) -> Self {
        Self {
            streaming: settings.streaming,
            track_history: settings.track_history,
        }
    }
}

/// Per-connection chat state.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: String,
    pub history: ConversationHistory,
    pub started_at: DateTime<Utc>,
}

/// Message handlers bound to an agent registry.
#[derive(Debug, Clone)]
pub struct ChatApp {
    registry: Arc<AgentRegistry>,
    run_config: RunConfig,
    options: ChatOptions,
}

impl ChatApp {
    pub fn new(registry: Arc<AgentRegistry>, run_config: RunConfig, options: ChatOptions) -> Self {
        Self {
            registry,
            run_config,
            options,
        }
    }

    pub fn options(&self) -> ChatOptions {
        self.options
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn on_chat_start(&self) -> ChatSession {
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            history: ConversationHistory::new(),
            started_at: Utc::now(),
        };
        info!(session = %session.id, "Chat started");
        session
    }

    /// Answers one user message.
    ///
    /// On failure the user turn is taken back out of the history, so the
    /// history keeps alternating user/assistant, and the error is returned.
    pub async fn on_message(
        &self,
        session: &mut ChatSession,
        text: &str,
        surface: &dyn ChatSurface,
    ) -> Result<String> {
        let track = self.options.track_history;
        if track {
            session.history.push_user(text);
        }

        match self.respond(session, text, surface).await {
            Ok(reply) => {
                if track {
                    session.history.push_assistant(reply.clone());
                }
                info!(
                    session = %session.id,
                    history = session.history.len(),
                    "Reply sent"
                );
                Ok(reply)
            }
            Err(e) => {
                if track {
                    session.history.pop_last();
                }
                warn!(session = %session.id, error = %e, "Message handling failed");
                Err(e)
            }
        }
    }

    async fn respond(
        &self,
        session: &ChatSession,
        text: &str,
        surface: &dyn ChatSurface,
    ) -> Result<String> {
        let entry = self.registry.entry();
        let mut reply = UiMessage::new(entry.name());
        surface.send(&reply).await?;

        let input: RunInput = if self.options.track_history {
            session.history.to_input()
        } else {
            text.into()
        };

        let final_output = if self.options.streaming {
            let agent = entry.as_ref().clone();
            let mut run = Runner::run_streamed(agent, input, self.run_config.clone());
            let mut final_output = None;
            while let Some(event) = run.next().await {
                match event {
                    StreamEvent::TextDelta { delta, .. } => {
                        reply.content.push_str(&delta);
                        surface.stream_token(&reply, &delta).await?;
                    }
                    StreamEvent::AgentUpdated { from, to } => {
                        info!(session = %session.id, from = %from, to = %to, "Agent changed");
                        reply.author = to;
                    }
                    StreamEvent::Completed { result } => {
                        final_output = Some(result.final_output);
                        break;
                    }
                    StreamEvent::Failed { error } => return Err(error),
                    StreamEvent::ToolCalled { .. } | StreamEvent::ToolOutput { .. } => {}
                }
            }
            let final_output = final_output.ok_or_else(|| {
                AgentsError::Other("run ended without a final result".to_string())
            })?;
            // Text emitted alongside tool calls is not part of the answer.
            reply.content = final_output.clone();
            final_output
        } else {
            let result = Runner::run(entry, input, &self.run_config).await?;
            reply.author = result.last_agent.clone();
            reply.content.push_str(&result.final_output);
            surface.stream_token(&reply, &result.final_output).await?;
            result.final_output
        };

        surface.update(&reply).await?;
        Ok(final_output)
    }

    pub fn on_chat_end(&self, session: ChatSession) {
        info!(
            session = %session.id,
            turns = session.history.turns(),
            "Chat ended"
        );
    }
}

/// Prints replies to a terminal (or any writer) as they stream in.
///
/// Tokens are printed as they arrive, including text the model emits in a
/// turn that ends in a tool call or handoff. A terminal cannot take that
/// text back, so when the final message differs from what was printed the
/// reply is printed again on its own line, prefixed with the answering
/// agent. The last line shown always matches the reply kept in history.
#[derive(Debug)]
pub struct TerminalSurface<W: Write + Send> {
    state: Mutex<TerminalState<W>>,
}

#[derive(Debug)]
struct TerminalState<W> {
    out: W,
    printed: String,
}

impl<W: Write + Send> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(TerminalState {
                out,
                printed: String::new(),
            }),
        }
    }

    pub fn into_inner(self) -> W {
        match self.state.into_inner() {
            Ok(state) => state.out,
            Err(poisoned) => poisoned.into_inner().out,
        }
    }

    fn with_state(&self, f: impl FnOnce(&mut TerminalState<W>) -> Result<()>) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AgentsError::Other("terminal writer poisoned".to_string()))?;
        f(&mut state)?;
        state.out.flush()?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send> ChatSurface for TerminalSurface<W> {
    async fn send(&self, message: &UiMessage) -> Result<()> {
        self.with_state(|state| {
            state.printed.clear();
            write!(state.out, "{}: ", message.author)?;
            Ok(())
        })
    }

    async fn stream_token(&self, _message: &UiMessage, token: &str) -> Result<()> {
        self.with_state(|state| {
            state.printed.push_str(token);
            state.out.write_all(token.as_bytes())?;
            Ok(())
        })
    }

    async fn update(&self, message: &UiMessage) -> Result<()> {
        self.with_state(|state| {
            writeln!(state.out)?;
            if state.printed != message.content {
                writeln!(state.out, "{}: {}", message.author, message.content)?;
            }
            state.printed.clear();
            Ok(())
        })
    }
}

/// One call made on a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Send(UiMessage),
    Token(String),
    Update(UiMessage),
}

/// Surface that remembers every call, for tests and headless use.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    calls: Mutex<Vec<SurfaceCall>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Every token relayed, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SurfaceCall::Token(token) => Some(token),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SurfaceCall) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| AgentsError::Other("recording surface poisoned".to_string()))?
            .push(call);
        Ok(())
    }
}

#[async_trait]
impl ChatSurface for RecordingSurface {
    async fn send(&self, message: &UiMessage) -> Result<()> {
        self.record(SurfaceCall::Send(message.clone()))
    }

    async fn stream_token(&self, _message: &UiMessage, token: &str) -> Result<()> {
        self.record(SurfaceCall::Token(token.to_string()))
    }

    async fn update(&self, message: &UiMessage) -> Result<()> {
        self.record(SurfaceCall::Update(message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{ModelResponse, Role, ToolCall};
    use crate::model::ScriptedProvider;
    use crate::registry::ENTRY_AGENT;
    use pretty_assertions::assert_eq;

    fn app(provider: ScriptedProvider, options: ChatOptions) -> (Arc<ScriptedProvider>, ChatApp) {
        let provider = Arc::new(provider);
        let registry = Arc::new(AgentRegistry::panacloud(provider.clone()));
        let app = ChatApp::new(registry, RunConfig::default(), options);
        (provider, app)
    }

    #[test]
    fn test_option_presets() {
        assert_eq!(ChatOptions::default(), ChatOptions::session());
        assert!(!ChatOptions::echo().streaming);
        assert!(!ChatOptions::echo().track_history);
        assert_eq!(ChatOptions::from(&ChatSettings::default()), ChatOptions::session());
    }

    #[tokio::test]
    async fn test_echo_sends_one_token() {
        let (provider, app) = app(
            ScriptedProvider::new("scripted").with_message("Hello there"),
            ChatOptions::echo(),
        );
        let mut session = app.on_chat_start();
        let surface = RecordingSurface::new();

        let reply = app.on_message(&mut session, "Hi", &surface).await.unwrap();
        assert_eq!(reply, "Hello there");
        assert!(session.history.is_empty());

        let calls = surface.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(
            &calls[0],
            SurfaceCall::Send(m) if m.content.is_empty() && m.author == ENTRY_AGENT
        ));
        assert_eq!(calls[1], SurfaceCall::Token("Hello there".to_string()));
        assert!(matches!(&calls[2], SurfaceCall::Update(m) if m.content == "Hello there"));

        let requests = provider.requests().await;
        assert_eq!(requests[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_session_streams_and_tracks_history() {
        let (provider, app) = app(
            ScriptedProvider::new("scripted")
                .with_message("First answer")
                .with_message("Second answer"),
            ChatOptions::session(),
        );
        let mut session = app.on_chat_start();
        let surface = RecordingSurface::new();

        app.on_message(&mut session, "one", &surface).await.unwrap();
        app.on_message(&mut session, "two", &surface).await.unwrap();

        assert_eq!(session.history.len(), 4);
        assert_eq!(session.history.messages()[3].content, "Second answer");
        assert_eq!(surface.tokens().concat(), "First answerSecond answer");

        // The second run sees the first exchange.
        let requests = provider.requests().await;
        let roles: Vec<Role> = requests[1].messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        app.on_chat_end(session);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_user_turn() {
        let (_, app) = app(
            ScriptedProvider::new("scripted")
                .with_message("ok")
                .with_error("quota exhausted"),
            ChatOptions::session(),
        );
        let mut session = app.on_chat_start();
        let surface = RecordingSurface::new();

        app.on_message(&mut session, "one", &surface).await.unwrap();
        let err = app
            .on_message(&mut session, "two", &surface)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentsError::ModelBehaviorError { .. }));
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history.messages()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_terminal_surface_output() {
        let (_, app) = app(
            ScriptedProvider::new("scripted").with_message("Hello from Panacloud"),
            ChatOptions::session(),
        );
        let mut session = app.on_chat_start();
        let surface = TerminalSurface::new(Vec::new());

        app.on_message(&mut session, "Hi", &surface).await.unwrap();
        let printed = String::from_utf8(surface.into_inner()).unwrap();
        assert_eq!(printed, "Panacloud Assistant: Hello from Panacloud\n");
    }

    #[tokio::test]
    async fn test_terminal_reprints_reply_after_routing_text() {
        let mut routed = ModelResponse::new_tool_calls(vec![ToolCall {
            id: "call_1".to_string(),
            name: "transfer_to_web_dev_agent".to_string(),
            arguments: serde_json::json!({}),
        }]);
        routed.content = Some("Let me route you. ".to_string());
        let (_, app) = app(
            ScriptedProvider::new("scripted")
                .with_response(routed)
                .with_message("Use HTML."),
            ChatOptions::session(),
        );
        let mut session = app.on_chat_start();
        let surface = TerminalSurface::new(Vec::new());

        app.on_message(&mut session, "How do I build a site?", &surface)
            .await
            .unwrap();

        assert_eq!(session.history.messages()[1].content, "Use HTML.");
        let printed = String::from_utf8(surface.into_inner()).unwrap();
        assert_eq!(
            printed,
            "Panacloud Assistant: Let me route you. Use HTML.\nWeb Dev Agent: Use HTML.\n"
        );
    }
}
