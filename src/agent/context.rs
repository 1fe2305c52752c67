//! Per-session conversation window

use std::collections::VecDeque;

/// One user/assistant round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// Recent history handed to the responder; in memory only
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub client_id: String,
    /// Action types the responder may emit as inline commands
    pub available_tools: Vec<String>,
    history: VecDeque<Exchange>,
    max_turns: usize,
}

impl ConversationContext {
    #[must_use]
    pub fn new(client_id: impl Into<String>, max_turns: usize) -> Self {
        Self {
            client_id: client_id.into(),
            available_tools: Vec::new(),
            history: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    /// Append an exchange, dropping the oldest beyond the window
    pub fn push(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        if self.max_turns == 0 {
            return;
        }
        while self.history.len() >= self.max_turns {
            self.history.pop_front();
        }
        self.history.push_back(Exchange {
            user: user.into(),
            assistant: assistant.into(),
        });
    }

    /// Oldest first
    pub fn history(&self) -> impl Iterator<Item = &Exchange> {
        self.history.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
