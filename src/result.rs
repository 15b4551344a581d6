//! Result types for agent execution

use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::error::{AgentsError, Result};
use crate::items::RunItem;
use crate::trace::Trace;
use crate::usage::UsageStats;

/// The result of running an agent to completion.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Text of the last assistant message.
    pub final_output: String,
    /// Everything that happened during the run, in order.
    pub items: Vec<RunItem>,
    /// The agent that produced the final output. Differs from the starting
    /// agent when a handoff happened.
    pub last_agent: String,
    pub usage: UsageStats,
    /// Span record, present only when tracing was enabled for the run.
    pub trace: Option<Trace>,
}

impl RunResult {
    /// Number of handoffs taken during the run.
    pub fn handoff_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, RunItem::Handoff(_)))
            .count()
    }
}

/// Events emitted by a streamed run.
///
/// A stream always ends with exactly one `Completed` or `Failed`.
#[derive(Debug)]
pub enum StreamEvent {
    /// A piece of assistant text as it arrives from the model.
    TextDelta { agent: String, delta: String },
    ToolCalled {
        agent: String,
        tool_name: String,
        arguments: Value,
    },
    ToolOutput {
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// The active agent changed because of a handoff.
    AgentUpdated { from: String, to: String },
    Completed { result: Box<RunResult> },
    Failed { error: AgentsError },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completed { .. } | StreamEvent::Failed { .. })
    }
}

/// Handle on a run executing in the background.
///
/// Implements [`Stream`] over [`StreamEvent`]s. Dropping it stops delivery;
/// the run finishes its current turn and exits.
pub struct RunResultStreaming {
    events: UnboundedReceiverStream<StreamEvent>,
}

impl RunResultStreaming {
    pub(crate) fn new(rx: UnboundedReceiver<StreamEvent>) -> Self {
        Self {
            events: UnboundedReceiverStream::new(rx),
        }
    }

    /// Drains the stream, passing every event before the terminal one to
    /// `on_event`, and returns the run's outcome.
    pub async fn final_result<F>(mut self, mut on_event: F) -> Result<RunResult>
    where
        F: FnMut(&StreamEvent),
    {
        while let Some(event) = self.events.next().await {
            match event {
                StreamEvent::Completed { result } => return Ok(*result),
                StreamEvent::Failed { error } => return Err(error),
                other => on_event(&other),
            }
        }
        Err(AgentsError::Other(
            "run ended without a final result".to_string(),
        ))
    }
}

impl Stream for RunResultStreaming {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl std::fmt::Debug for RunResultStreaming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunResultStreaming").finish_non_exhaustive()
    }
}
