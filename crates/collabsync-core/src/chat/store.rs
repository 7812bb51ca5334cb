//! Replicated, deduplicated chat log with lazy expiry

use std::collections::HashSet;

use tracing::debug;

use super::message::ChatMessage;
use crate::types::{MessageId, Timestamp};

/// Local replica of the chat log.
///
/// Kept sorted ascending by creation time (ties by id) so arrival order never
/// affects display order. Each id appears at most once.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Insert a message in display order.
    ///
    /// Returns false (and changes nothing) for a duplicate id or a message
    /// already expired at `now`.
    pub fn insert(&mut self, message: ChatMessage, now: Timestamp) -> bool {
        if message.is_expired(now) || self.contains(&message.id) {
            return false;
        }
        let pos = self
            .messages
            .partition_point(|m| m.order_key() <= message.order_key());
        self.messages.insert(pos, message);
        true
    }

    /// Union with a batch of incoming messages. Returns the ids actually added.
    pub fn merge(&mut self, incoming: Vec<ChatMessage>, now: Timestamp) -> Vec<MessageId> {
        let mut known: HashSet<MessageId> = self.messages.iter().map(|m| m.id.clone()).collect();
        let mut added = Vec::new();
        for message in incoming {
            if message.is_expired(now) || !known.insert(message.id.clone()) {
                continue;
            }
            added.push(message.id.clone());
            self.messages.push(message);
        }
        if !added.is_empty() {
            self.messages
                .sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        }
        added
    }

    /// Remove by id. No-op if absent.
    pub fn remove(&mut self, id: &MessageId) -> Option<ChatMessage> {
        let pos = self.messages.iter().position(|m| &m.id == id)?;
        Some(self.messages.remove(pos))
    }

    /// Drop every message. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.messages.len();
        self.messages.clear();
        n
    }

    /// Drop messages whose expiry has passed. Returns the removed ids.
    pub fn sweep_expired(&mut self, now: Timestamp) -> Vec<MessageId> {
        let mut removed = Vec::new();
        self.messages.retain(|m| {
            if m.is_expired(now) {
                removed.push(m.id.clone());
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            debug!(count = removed.len(), "Swept expired messages");
        }
        removed
    }

    /// Messages still visible at `now`, in display order
    pub fn live(&self, now: Timestamp) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| !m.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }
}
