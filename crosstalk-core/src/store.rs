//! Message store: ordered messages, most recently inserted first.

use std::collections::VecDeque;

use crate::message::Message;

/// Ordered message sequence shown by the front end. Only the session inserts.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: VecDeque<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, message: Message) {
        self.messages.push_front(message);
    }

    /// Most recently inserted message.
    pub fn latest(&self) -> Option<&Message> {
        self.messages.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Owned copy, newest first, for publishing to observers.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }
}
