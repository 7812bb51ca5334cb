//! Chat message record

use serde::{Deserialize, Serialize};

use crate::types::{Actor, MessageId, Timestamp};

/// Maximum characters of message text carried in an activity preview
pub const PREVIEW_CHARS: usize = 50;

/// A chat message as replicated between peers.
///
/// The author snapshot is taken at send time, so a message keeps showing
/// the sender's name/color/avatar as they were when it was sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Globally unique id, minted by the sender
    pub id: MessageId,
    pub author: Actor,
    /// Trimmed, non-empty text
    pub text: String,
    /// Unix timestamp in milliseconds when the message was created
    pub created_at: Timestamp,
    /// Absolute expiry, if the message is ephemeral
    pub expires_at: Option<Timestamp>,
}

impl ChatMessage {
    /// Build a message from raw input.
    ///
    /// Returns `None` if the text is empty after trimming. A non-positive
    /// `expires_in_ms` means the message never expires.
    pub fn compose(
        author: Actor,
        text: &str,
        now: Timestamp,
        expires_in_ms: Option<i64>,
    ) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            id: MessageId::generate(),
            author,
            text: text.to_string(),
            created_at: now,
            expires_at: expires_in_ms.filter(|d| *d > 0).map(|d| now.saturating_add(d)),
        })
    }

    /// Whether the message is past its expiry at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// First [`PREVIEW_CHARS`] characters of the text
    pub fn preview(&self) -> String {
        self.text.chars().take(PREVIEW_CHARS).collect()
    }

    /// Countdown label for an ephemeral message ("12s", "3m").
    ///
    /// `None` for permanent or already expired messages.
    pub fn time_left(&self, now: Timestamp) -> Option<String> {
        let remaining = self.expires_at?.saturating_sub(now);
        if remaining <= 0 {
            return None;
        }
        let seconds = remaining.saturating_add(999) / 1000;
        if seconds < 60 {
            Some(format!("{}s", seconds))
        } else {
            Some(format!("{}m", (seconds + 59) / 60))
        }
    }

    /// Display order key: creation time, then id for a stable tie-break
    pub(crate) fn order_key(&self) -> (Timestamp, &MessageId) {
        (self.created_at, &self.id)
    }
}
