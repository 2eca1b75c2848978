//! Triage conversation history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generation::ChatRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistory {
    messages: Vec<HistoryMessage>,
    max_messages: usize,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ChatHistory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: max_messages.max(1),
        }
    }

    /// Append a message, dropping the oldest past `max_messages`.
    pub fn push(&mut self, role: ChatRole, content: impl Into<String>) {
        self.messages.push(HistoryMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    pub fn messages(&self) -> &[HistoryMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
