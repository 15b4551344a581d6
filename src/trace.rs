//! # Run traces
//!
//! A trace is the span record of one agent run: every agent turn, model
//! generation, tool call and handoff becomes a [`Span`]. Spans nest under the
//! agent turn that produced them. The record is attached to the run result
//! unless the run config sets `tracing_disabled`, which is the default for
//! the Panacloud wiring.
//!
//! Log output through the `tracing` crate is independent of this switch: the
//! recorder always emits its structured events, it only skips keeping spans.
//!
//! ```rust
//! use panacloud_agents::trace::{SpanKind, TraceRecorder};
//!
//! let mut recorder = TraceRecorder::new(true);
//! let turn = recorder.start_span(SpanKind::Agent { agent_name: "Panacloud Assistant".into() });
//! let tool = recorder.start_span(SpanKind::Tool { tool_name: "backend_developer".into() });
//! recorder.end_span(tool.as_deref());
//! recorder.end_span(turn.as_deref());
//!
//! let trace = recorder.finish().unwrap();
//! assert_eq!(trace.spans.len(), 2);
//! assert_eq!(trace.spans[1].parent_id, turn);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::usage::Usage;

pub type TraceId = String;
pub type SpanId = String;

pub fn gen_trace_id() -> TraceId {
    format!("trace_{}", Uuid::new_v4().simple())
}

/// What a span measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SpanKind {
    Agent {
        agent_name: String,
    },
    Generation {
        model: String,
        prompt_tokens: usize,
        completion_tokens: usize,
    },
    Tool {
        tool_name: String,
    },
    Handoff {
        from_agent: String,
        to_agent: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: SpanId,
    pub parent_id: Option<SpanId>,
    pub kind: SpanKind,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Span {
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// Completed span record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: TraceId,
    pub spans: Vec<Span>,
}

impl Trace {
    pub fn spans_of<'a>(
        &'a self,
        pred: impl Fn(&SpanKind) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Span> + 'a {
        self.spans.iter().filter(move |s| pred(&s.kind))
    }
}

/// Collects spans for a single run.
///
/// Owned by the run loop, so no locking is involved. When disabled every
/// call is a no-op and `start_span` hands back `None`.
#[derive(Debug)]
pub struct TraceRecorder {
    trace_id: TraceId,
    enabled: bool,
    current: Option<SpanId>,
    spans: Vec<Span>,
}

impl TraceRecorder {
    pub fn new(enabled: bool) -> Self {
        Self {
            trace_id: gen_trace_id(),
            enabled,
            current: None,
            spans: Vec::new(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn start_span(&mut self, kind: SpanKind) -> Option<SpanId> {
        if !self.enabled {
            return None;
        }
        let id = format!("span_{}", Uuid::new_v4().simple());
        debug!(trace_id = %self.trace_id, span_id = %id, kind = ?kind, "Starting span");
        self.spans.push(Span {
            id: id.clone(),
            parent_id: self.current.clone(),
            kind,
            start_time: Utc::now(),
            end_time: None,
            error: None,
        });
        self.current = Some(id.clone());
        Some(id)
    }

    pub fn end_span(&mut self, span_id: Option<&str>) {
        let Some(span_id) = span_id else { return };
        if let Some(span) = self.spans.iter_mut().find(|s| s.id == span_id) {
            span.end_time = Some(Utc::now());
            if self.current.as_deref() == Some(span_id) {
                self.current = span.parent_id.clone();
            }
        }
    }

    pub fn fail_span(&mut self, span_id: Option<&str>, message: impl Into<String>) {
        let Some(id) = span_id else { return };
        let message = message.into();
        error!(trace_id = %self.trace_id, span_id = %id, error = %message, "Span failed");
        if let Some(span) = self.spans.iter_mut().find(|s| s.id == id) {
            span.error = Some(message);
        }
        self.end_span(Some(id));
    }

    /// Stores token counts on a generation span and closes it.
    pub fn end_generation(&mut self, span_id: Option<&str>, usage: &Usage) {
        let Some(id) = span_id else { return };
        if let Some(span) = self.spans.iter_mut().find(|s| s.id == id) {
            if let SpanKind::Generation {
                prompt_tokens,
                completion_tokens,
                ..
            } = &mut span.kind
            {
                *prompt_tokens = usage.prompt_tokens;
                *completion_tokens = usage.completion_tokens;
            }
        }
        self.end_span(Some(id));
    }

    /// Consumes the recorder; `None` when tracing was disabled.
    pub fn finish(self) -> Option<Trace> {
        self.enabled.then(|| Trace {
            trace_id: self.trace_id,
            spans: self.spans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_recorder_keeps_nothing() {
        let mut recorder = TraceRecorder::new(false);
        let id = recorder.start_span(SpanKind::Agent {
            agent_name: "Web Dev Agent".to_string(),
        });
        assert!(id.is_none());
        recorder.end_span(id.as_deref());
        assert!(recorder.trace_id().starts_with("trace_"));
        assert!(recorder.finish().is_none());
    }

    #[test]
    fn test_generation_span_records_usage() {
        let mut recorder = TraceRecorder::new(true);
        let agent = recorder.start_span(SpanKind::Agent {
            agent_name: "Panacloud Assistant".to_string(),
        });
        let gen = recorder.start_span(SpanKind::Generation {
            model: "gemini-2.0-flash".to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
        });
        recorder.end_generation(gen.as_deref(), &Usage::new(12, 3));
        recorder.end_span(agent.as_deref());

        let trace = recorder.finish().unwrap();
        let generation = trace
            .spans_of(|k| matches!(k, SpanKind::Generation { .. }))
            .next()
            .unwrap();
        assert_eq!(
            generation.kind,
            SpanKind::Generation {
                model: "gemini-2.0-flash".to_string(),
                prompt_tokens: 12,
                completion_tokens: 3,
            }
        );
        assert_eq!(generation.parent_id, agent);
        assert!(generation.duration_ms().is_some());
    }

    #[test]
    fn test_failed_span_restores_parent() {
        let mut recorder = TraceRecorder::new(true);
        let agent = recorder.start_span(SpanKind::Agent {
            agent_name: "Agentic AI Agent".to_string(),
        });
        let tool = recorder.start_span(SpanKind::Tool {
            tool_name: "devops_engineer".to_string(),
        });
        recorder.fail_span(tool.as_deref(), "boom");
        let handoff = recorder.start_span(SpanKind::Handoff {
            from_agent: "a".to_string(),
            to_agent: "b".to_string(),
        });

        let trace = recorder.finish().unwrap();
        assert_eq!(trace.spans[1].error.as_deref(), Some("boom"));
        assert_eq!(trace.spans[2].parent_id, agent);
        assert_eq!(trace.spans[2].id, handoff.unwrap());
    }
}
