//! In-memory conversation history for one chat session.
//!
//! Only user and assistant messages are kept; tool traffic and system
//! messages belong to individual runs and never enter the history. The
//! history lives as long as its chat session and is never persisted.

use serde::{Deserialize, Serialize};

use crate::items::{Message, Role};
use crate::runner::RunInput;

/// Ordered user/assistant exchange of one chat session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Removes the most recent message. Used to roll back a user turn whose
    /// run failed, so roles keep alternating.
    pub fn pop_last(&mut self) -> Option<Message> {
        self.messages.pop()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of completed user/assistant exchanges.
    pub fn turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }

    /// The whole history as run input.
    pub fn to_input(&self) -> RunInput {
        RunInput::Messages(self.messages.clone())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_push_and_pop() {
        let mut history = ConversationHistory::new();
        assert!(history.is_empty());

        history.push_user("What is Agentic AI?");
        history.push_assistant("Agents that act.");
        history.push_user("And handoffs?");
        assert_eq!(history.len(), 3);
        assert_eq!(history.turns(), 1);

        let popped = history.pop_last().unwrap();
        assert_eq!(popped, Message::user("And handoffs?"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_to_input_carries_every_message() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");
        history.push_assistant("hello");

        assert_eq!(
            history.to_input(),
            RunInput::Messages(vec![Message::user("hi"), Message::assistant("hello")])
        );
    }

    #[test]
    fn test_serializes_as_plain_message_list() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json, serde_json::json!([{"role": "user", "content": "hi"}]));

        history.clear();
        assert!(history.is_empty());
    }

    proptest! {
        #[test]
        fn prop_history_alternates_roles(
            turns in proptest::collection::vec((".{0,20}", ".{0,20}"), 0..16)
        ) {
            let mut history = ConversationHistory::new();
            for (question, answer) in &turns {
                history.push_user(question.clone());
                history.push_assistant(answer.clone());
            }

            prop_assert_eq!(history.len(), 2 * turns.len());
            prop_assert_eq!(history.turns(), turns.len());
            for (i, message) in history.messages().iter().enumerate() {
                let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
                prop_assert_eq!(message.role, expected);
            }
        }

        #[test]
        fn prop_rolled_back_turn_keeps_alternation(
            completed in 0usize..8,
            question in ".{0,20}",
        ) {
            let mut history = ConversationHistory::new();
            for i in 0..completed {
                history.push_user(format!("q{i}"));
                history.push_assistant(format!("a{i}"));
            }
            history.push_user(question);
            history.pop_last();

            prop_assert_eq!(history.len(), 2 * completed);
            prop_assert!(history
                .messages()
                .last()
                .map_or(true, |m| m.role == Role::Assistant));
        }
    }
}
