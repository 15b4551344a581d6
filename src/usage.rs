//! Token usage accounting for agent runs
//!
//! A [`Usage`] describes one chat-completions call. [`UsageStats`] folds the
//! calls of one run together, keyed by the agent that made them, so a
//! handoff chain or a nested agent-tool run can be read back per agent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Add;

/// Token usage of a single model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    pub request_count: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            request_count: 1,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add_usage(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.request_count += other.request_count;
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self.add_usage(&other);
        self
    }
}

/// Aggregated usage for a run, with a per-agent breakdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total: Usage,
    pub by_agent: BTreeMap<String, Usage>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, agent: &str, usage: Usage) {
        self.total.add_usage(&usage);
        self.by_agent
            .entry(agent.to_string())
            .and_modify(|u| u.add_usage(&usage))
            .or_insert(usage);
    }

    /// Folds another run's stats (e.g. a nested agent-tool run) into this one.
    pub fn merge(&mut self, other: &UsageStats) {
        for (agent, usage) in &other.by_agent {
            self.record(agent, usage.clone());
        }
    }

    pub fn summary(&self) -> String {
        let mut report = format!(
            "Total Tokens: {} ({} requests)\n",
            self.total.total_tokens, self.total.request_count
        );
        for (agent, usage) in &self.by_agent {
            report.push_str(&format!(
                "  {}: {} tokens, {} requests\n",
                agent, usage.total_tokens, usage.request_count
            ));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_add_operator() {
        let combined = Usage::new(100, 50) + Usage::new(200, 100);

        assert_eq!(combined.prompt_tokens, 300);
        assert_eq!(combined.completion_tokens, 150);
        assert_eq!(combined.total_tokens, 450);
        assert_eq!(combined.request_count, 2);
    }

    #[test]
    fn test_usage_stats_by_agent() {
        let mut stats = UsageStats::new();
        stats.record("Panacloud Assistant", Usage::new(100, 50));
        stats.record("Web Dev Agent", Usage::new(200, 100));
        stats.record("Panacloud Assistant", Usage::new(10, 5));

        assert_eq!(stats.total.total_tokens, 465);
        assert_eq!(stats.total.request_count, 3);
        assert_eq!(stats.by_agent["Panacloud Assistant"].total_tokens, 165);
        assert_eq!(stats.by_agent["Panacloud Assistant"].request_count, 2);
    }

    #[test]
    fn test_usage_stats_merge() {
        let mut outer = UsageStats::new();
        outer.record("Agentic AI Agent", Usage::new(10, 10));

        let mut nested = UsageStats::new();
        nested.record("Backend Developer", Usage::new(5, 5));

        outer.merge(&nested);
        assert_eq!(outer.total.total_tokens, 30);
        assert_eq!(outer.by_agent.len(), 2);
        assert!(outer.summary().contains("Backend Developer: 10 tokens"));
    }
}
