//! OpenAI-compatible chat-completions provider
//!
//! [`ChatCompletionsModel`] drives any endpoint that speaks the OpenAI
//! chat-completions protocol through `async-openai`. The Panacloud wiring
//! points it at Gemini's OpenAI-compatible endpoint.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionMessageToolCallChunk,
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionStreamOptions, ChatCompletionTool, ChatCompletionToolArgs,
        ChatCompletionToolType,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, FinishReason, FunctionCall,
        FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use crate::error::{AgentsError, Result};
use crate::items::{Message, ModelResponse, Role, ToolCall};
use crate::model::{ModelEventStream, ModelProvider, ModelRequest, ModelStreamEvent, ToolSpec};
use crate::usage::Usage;

/// Gemini's OpenAI-compatible base URL.
pub const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";

/// Builds an async-openai client for an OpenAI-compatible endpoint.
///
/// `async-openai` appends request paths verbatim, so a trailing slash on the
/// base URL is dropped.
pub fn openai_client(api_key: &str, base_url: &str) -> Client<OpenAIConfig> {
    let config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(base_url.trim_end_matches('/'));
    Client::with_config(config)
}

/// Chat-completions model bound to a client.
#[derive(Clone)]
pub struct ChatCompletionsModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl std::fmt::Debug for ChatCompletionsModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsModel")
            .field("model", &self.model)
            .finish()
    }
}

impl ChatCompletionsModel {
    pub fn new(model: impl Into<String>, client: Client<OpenAIConfig>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn convert_message(msg: &Message) -> Result<ChatCompletionRequestMessage> {
        let converted: ChatCompletionRequestMessage = match msg.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                if !msg.content.is_empty() {
                    builder.content(msg.content.clone());
                }
                if let Some(tool_calls) = &msg.tool_calls {
                    let calls: Vec<_> = tool_calls
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect();
                    builder.tool_calls(calls);
                }
                builder.build()?.into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .content(msg.content.clone())
                .tool_call_id(msg.tool_call_id.clone().unwrap_or_default())
                .build()?
                .into(),
        };
        Ok(converted)
    }

    fn convert_tools(tools: &[ToolSpec]) -> Result<Vec<ChatCompletionTool>> {
        tools
            .iter()
            .map(|tool| {
                let function = FunctionObjectArgs::default()
                    .name(tool.name.clone())
                    .description(tool.description.clone())
                    .parameters(tool.parameters.clone())
                    .build()?;
                Ok(ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(function)
                    .build()?)
            })
            .collect()
    }

    fn build_request(&self, request: ModelRequest) -> Result<CreateChatCompletionRequest> {
        let messages = request
            .messages
            .iter()
            .map(Self::convert_message)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone()).messages(messages);

        if !request.tools.is_empty() {
            args.tools(Self::convert_tools(&request.tools)?);
        }
        if let Some(temp) = request.temperature {
            args.temperature(temp);
        }
        if let Some(max) = request.max_tokens {
            args.max_tokens(max);
        }

        Ok(args.build()?)
    }

    /// Like [`build_request`](Self::build_request), but asks for a final
    /// usage chunk so streamed turns are counted too.
    fn build_stream_request(&self, request: ModelRequest) -> Result<CreateChatCompletionRequest> {
        let mut request = self.build_request(request)?;
        request.stream_options = Some(ChatCompletionStreamOptions {
            include_usage: true,
        });
        Ok(request)
    }
}

/// Tool arguments arrive as a JSON string; keep the raw text when it does
/// not parse so the tool still sees what the model sent.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Wire name of a finish reason (`stop`, `tool_calls`, ...).
fn finish_reason_name(reason: &FinishReason) -> String {
    serde_json::to_value(reason)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", reason))
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles tool calls from streamed chunks.
///
/// Fragments are keyed by the index the API assigns, so interleaved calls
/// are kept apart. Calls come back in index order; a call that never got
/// an id is named `call_<index>`.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    partial: BTreeMap<u32, PartialToolCall>,
}

impl ToolCallAccumulator {
    fn push(&mut self, chunk: ChatCompletionMessageToolCallChunk) {
        let entry = self.partial.entry(chunk.index).or_default();
        if let Some(id) = chunk.id {
            entry.id = id;
        }
        if let Some(function) = chunk.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    fn finish(self) -> Vec<ToolCall> {
        self.partial
            .into_iter()
            .map(|(index, call)| ToolCall {
                id: if call.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    call.id
                },
                name: call.name,
                arguments: parse_arguments(&call.arguments),
            })
            .collect()
    }
}

#[async_trait]
impl ModelProvider for ChatCompletionsModel {
    async fn complete(&self, request: ModelRequest) -> Result<(ModelResponse, Usage)> {
        let request = self.build_request(request)?;
        let response = self.client.chat().create(request).await?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| AgentsError::ModelBehaviorError {
                message: "No choices in response".to_string(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .as_ref()
            .map(|calls| {
                calls
                    .iter()
                    .map(|tc| ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: parse_arguments(&tc.function.arguments),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let model_response = ModelResponse {
            id: response.id.clone(),
            content: choice.message.content.clone(),
            tool_calls,
            finish_reason: choice.finish_reason.as_ref().map(finish_reason_name),
            created_at: chrono::Utc::now(),
        };

        let usage = response
            .usage
            .as_ref()
            .map(|u| Usage::new(u.prompt_tokens as usize, u.completion_tokens as usize))
            .unwrap_or_default();

        Ok((model_response, usage))
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelEventStream> {
        let request = self.build_stream_request(request)?;
        let mut upstream = self.client.chat().create_stream(request).await?;
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut tool_calls = ToolCallAccumulator::default();
            let mut finish_reason = None;

            while let Some(chunk) = upstream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "chat completion stream failed");
                        let _ = tx.send(Err(AgentsError::from(e)));
                        return;
                    }
                };

                if let Some(u) = &chunk.usage {
                    let usage =
                        Usage::new(u.prompt_tokens as usize, u.completion_tokens as usize);
                    if tx.send(Ok(ModelStreamEvent::Usage(usage))).is_err() {
                        return;
                    }
                }

                for choice in chunk.choices {
                    if let Some(text) = choice.delta.content {
                        if !text.is_empty()
                            && tx.send(Ok(ModelStreamEvent::TextDelta(text))).is_err()
                        {
                            debug!("stream receiver dropped");
                            return;
                        }
                    }
                    for call in choice.delta.tool_calls.unwrap_or_default() {
                        tool_calls.push(call);
                    }
                    if let Some(reason) = choice.finish_reason {
                        finish_reason = Some(finish_reason_name(&reason));
                    }
                }
            }

            for call in tool_calls.finish() {
                if tx.send(Ok(ModelStreamEvent::ToolCall(call))).is_err() {
                    return;
                }
            }
            let _ = tx.send(Ok(ModelStreamEvent::Done { finish_reason }));
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
