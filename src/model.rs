//! Model abstraction for LLM interactions
//!
//! The runner talks to models only through [`ModelProvider`]. A provider
//! either answers a whole turn at once ([`ModelProvider::complete`]) or
//! streams it as [`ModelStreamEvent`]s ([`ModelProvider::stream`]). The
//! chat-completions implementation lives in `provider.rs`; this module also
//! carries [`ScriptedProvider`], a deterministic provider that replays canned
//! turns and is what the tests run against.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AgentsError, Result};
use crate::items::{Message, ModelResponse, ToolCall};
use crate::usage::Usage;

/// Declaration of a callable tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One model call: the conversation so far plus the tools on offer.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Incremental output of a streamed model call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStreamEvent {
    TextDelta(String),
    /// A fully assembled tool call; emitted once its argument deltas are complete.
    ToolCall(ToolCall),
    Usage(Usage),
    Done { finish_reason: Option<String> },
}

pub type ModelEventStream = BoxStream<'static, Result<ModelStreamEvent>>;

/// Trait for model providers
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Generate a completion for one turn
    async fn complete(&self, request: ModelRequest) -> Result<(ModelResponse, Usage)>;

    /// Stream a completion for one turn.
    ///
    /// The default implementation runs [`complete`](Self::complete) and
    /// replays its result as a single delta.
    async fn stream(&self, request: ModelRequest) -> Result<ModelEventStream> {
        let (response, usage) = self.complete(request).await?;
        let events = replay_events(response, usage, |text| vec![text.to_string()]);
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }

    /// Get the model name
    fn model_name(&self) -> &str;
}

fn replay_events(
    response: ModelResponse,
    usage: Usage,
    split: impl Fn(&str) -> Vec<String>,
) -> Vec<ModelStreamEvent> {
    let mut events: Vec<ModelStreamEvent> = split(response.text())
        .into_iter()
        .filter(|chunk| !chunk.is_empty())
        .map(ModelStreamEvent::TextDelta)
        .collect();
    events.extend(response.tool_calls.into_iter().map(ModelStreamEvent::ToolCall));
    events.push(ModelStreamEvent::Usage(usage));
    events.push(ModelStreamEvent::Done {
        finish_reason: response.finish_reason,
    });
    events
}

/// Folds a model stream back into a single response, handing every text
/// delta to `on_delta` as it arrives.
pub async fn collect_stream<F>(
    mut events: ModelEventStream,
    mut on_delta: F,
) -> Result<(ModelResponse, Usage)>
where
    F: FnMut(&str) + Send,
{
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = Usage::empty();
    let mut finish_reason = None;

    while let Some(event) = events.next().await {
        match event? {
            ModelStreamEvent::TextDelta(delta) => {
                on_delta(&delta);
                content.push_str(&delta);
            }
            ModelStreamEvent::ToolCall(call) => tool_calls.push(call),
            ModelStreamEvent::Usage(u) => usage.add_usage(&u),
            ModelStreamEvent::Done { finish_reason: r } => finish_reason = r,
        }
    }

    let response = ModelResponse {
        id: Uuid::new_v4().to_string(),
        content: (!content.is_empty()).then_some(content),
        tool_calls,
        finish_reason,
        created_at: chrono::Utc::now(),
    };
    Ok((response, usage))
}

enum Scripted {
    Response(ModelResponse),
    Error(String),
}

/// Provider that replays a fixed script of turns.
///
/// Each call pops the next scripted turn; once the script is exhausted every
/// call answers `"Default response"`. All requests are kept so tests can
/// inspect what the runner sent. Streaming splits text on word boundaries.
pub struct ScriptedProvider {
    model: String,
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, response: ModelResponse) -> Self {
        self.script.get_mut().push_back(Scripted::Response(response));
        self
    }

    pub fn with_message(self, content: impl Into<String>) -> Self {
        self.with_response(ModelResponse::new_message(content))
    }

    pub fn with_tool_call(self, tool_name: impl Into<String>, args: Value) -> Self {
        let tool_call = ToolCall {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: tool_name.into(),
            arguments: args,
        };
        self.with_response(ModelResponse::new_tool_calls(vec![tool_call]))
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.script.get_mut().push_back(Scripted::Error(message.into()));
        self
    }

    /// Every request received so far, in call order.
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_turn(&self, request: ModelRequest) -> Result<(ModelResponse, Usage)> {
        self.requests.lock().await.push(request);
        match self.script.lock().await.pop_front() {
            Some(Scripted::Response(response)) => Ok((response, Usage::new(10, 5))),
            Some(Scripted::Error(message)) => Err(AgentsError::ModelBehaviorError { message }),
            None => Ok((
                ModelResponse::new_message("Default response"),
                Usage::new(10, 5),
            )),
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, request: ModelRequest) -> Result<(ModelResponse, Usage)> {
        self.next_turn(request).await
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelEventStream> {
        let (response, usage) = self.next_turn(request).await?;
        let events = replay_events(response, usage, |text| {
            text.split_inclusive(' ').map(str::to_string).collect()
        });
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
