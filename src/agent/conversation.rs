//! Conversation history management
//!
//! Maintains per-agent chat history with a configurable bound. The system
//! turn is not stored here; it is rebuilt on every request because peer
//! information can change between turns.

use std::collections::VecDeque;

use crate::core::{Message, Role};

/// Manages conversation history
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Message history, oldest first
    messages: VecDeque<Message>,
    /// Maximum history length
    max_length: usize,
}

impl Conversation {
    /// Create a new conversation
    pub fn new(max_length: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_length,
        }
    }

    /// Add a message and maintain the size limit
    pub fn add(&mut self, message: Message) {
        self.messages.push_back(message);

        // Remove oldest messages if over limit (but keep recent context)
        while self.messages.len() > self.max_length {
            self.messages.pop_front();
        }
    }

    /// Get all messages in order
    pub fn get_messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Get the last assistant message
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
    }

    /// Get message count
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(1000)
    }
}
