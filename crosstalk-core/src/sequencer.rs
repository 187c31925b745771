//! Arrival-order release for received messages.
//!
//! Each received message gets a sequence number on arrival. Settled messages are
//! held until every earlier one has settled, then released together, so a slow
//! translation delays later messages instead of being overtaken by them.

use std::collections::BTreeMap;

use crate::message::Message;

/// How received messages reach the store.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum DeliveryOrder {
    /// Insert each message as soon as it settles. Translated messages may land out of arrival order.
    #[default]
    Settled,
    /// Release messages strictly in arrival order.
    Arrival,
}

#[derive(Debug, Default)]
pub struct Sequencer {
    next_assign: u64,
    next_release: u64,
    held: BTreeMap<u64, Message>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number for the next arriving message.
    pub fn assign(&mut self) -> u64 {
        let seq = self.next_assign;
        self.next_assign = self.next_assign.saturating_add(1);
        seq
    }

    /// Record a settled message; returns the messages now releasable, oldest first.
    pub fn settle(&mut self, seq: u64, message: Message) -> Vec<Message> {
        if seq < self.next_release {
            // Already released; a duplicate completion.
            return vec![];
        }
        self.held.insert(seq, message);
        let mut out = Vec::new();
        while let Some(m) = self.held.remove(&self.next_release) {
            out.push(m);
            self.next_release = self.next_release.saturating_add(1);
        }
        out
    }

    /// Number of settled messages waiting on an earlier one.
    pub fn held(&self) -> usize {
        self.held.len()
    }
}
