//! Conversation state owned by one driver invocation

use tracing::debug;

use crate::llm::{Message, Role};

/// Ordered turns of a single reasoning-loop conversation
///
/// The first turn is the task framing and is never dropped by pruning.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation with the task-framing user message
    pub fn new(first_message: impl Into<String>) -> Self {
        debug!("Conversation::new: called");
        Self {
            messages: vec![Message::user(first_message)],
        }
    }

    /// Wrap an existing list of turns
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        debug!(role = ?message.role, turns = self.messages.len() + 1, "Conversation::push: called");
        self.messages.push(message);
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

    /// Replace all turns with a pruned copy
    pub fn replace(&mut self, messages: Vec<Message>) {
        debug!(before = self.messages.len(), after = messages.len(), "Conversation::replace: called");
        self.messages = messages;
    }

    /// Text of the most recent assistant turn, if it has any
    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant).and_then(|m| match &m.content {
            crate::llm::MessageContent::Text(text) => Some(text.clone()),
            crate::llm::MessageContent::Blocks(blocks) => {
                let parts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        crate::llm::ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                if parts.is_empty() { None } else { Some(parts.join("\n")) }
            }
        })
    }
}
