//! The conversation store: an ordered transcript that always opens with one
//! hidden system directive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persona directive placed at the head of every conversation.
pub const SYSTEM_PERSONA: &str = "You are a helpful and friendly AI assistant.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single role-tagged message. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Ordered message history. The first element is always the system message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// A fresh transcript holding only the persona directive.
    pub fn new() -> Self {
        Self {
            messages: vec![Message::system(SYSTEM_PERSONA)],
        }
    }

    /// Creates the conversation in `slot` if there is none yet. A second call is a no-op.
    pub fn initialize(slot: &mut Option<Conversation>) -> &mut Conversation {
        slot.get_or_insert_with(Conversation::new)
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
    }

    /// Drops every message and reinstates the system directive.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(Message::system(SYSTEM_PERSONA));
    }

    /// Everything except the system directive, in insertion order.
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> + Clone + '_ {
        self.messages.iter().filter(|m| m.role != Role::System)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true: the system message is always present.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn visible_len(&self) -> usize {
        self.messages.len().saturating_sub(1)
    }
}
