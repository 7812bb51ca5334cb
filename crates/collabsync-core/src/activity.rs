//! Bounded activity feed
//!
//! A reverse-chronological log of user-visible events, merged across peers by
//! id and capped at a fixed size. Entries never expire by age.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{Actor, EventId, Theme, Timestamp};

/// Kind of activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    UserJoined,
    UserLeft,
    MessageSent,
    CounterChanged,
    ThemeChanged,
    NameChanged,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::UserJoined => "user_joined",
            ActivityKind::UserLeft => "user_left",
            ActivityKind::MessageSent => "message_sent",
            ActivityKind::CounterChanged => "counter_changed",
            ActivityKind::ThemeChanged => "theme_changed",
            ActivityKind::NameChanged => "name_changed",
        }
    }
}

/// Typed detail payload attached to an activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityDetails {
    None,
    MessagePreview { preview: String },
    CounterChange { old_value: i64, new_value: i64 },
    ThemeChange { old_theme: Theme, new_theme: Theme },
    NameChange { old_name: String, new_name: String },
}

/// One entry in the activity feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: EventId,
    pub kind: ActivityKind,
    pub actor: Actor,
    pub timestamp: Timestamp,
    pub details: ActivityDetails,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, actor: Actor, timestamp: Timestamp, details: ActivityDetails) -> Self {
        Self {
            id: EventId::generate(),
            kind,
            actor,
            timestamp,
            details,
        }
    }

    /// Human-readable line for the feed, without the actor name
    pub fn describe(&self) -> String {
        match (self.kind, &self.details) {
            (ActivityKind::UserJoined, _) => "joined the session".to_string(),
            (ActivityKind::UserLeft, _) => "left the session".to_string(),
            (ActivityKind::MessageSent, ActivityDetails::MessagePreview { preview }) => {
                let short: String = preview.chars().take(30).collect();
                let ellipsis = if preview.chars().count() > 30 { "..." } else { "" };
                format!("sent: \"{short}{ellipsis}\"")
            }
            (ActivityKind::MessageSent, _) => "sent a message".to_string(),
            (
                ActivityKind::CounterChanged,
                ActivityDetails::CounterChange {
                    old_value,
                    new_value,
                },
            ) => {
                // A set can span the whole i64 range
                let diff = i128::from(*new_value) - i128::from(*old_value);
                match diff.cmp(&0) {
                    Ordering::Greater => format!("incremented counter (+{diff})"),
                    Ordering::Less => format!("decremented counter ({diff})"),
                    Ordering::Equal => "reset counter to 0".to_string(),
                }
            }
            (ActivityKind::CounterChanged, _) => "changed the counter".to_string(),
            (ActivityKind::ThemeChanged, ActivityDetails::ThemeChange { new_theme, .. }) => {
                format!("changed theme to {new_theme}")
            }
            (ActivityKind::ThemeChanged, _) => "changed the theme".to_string(),
            (ActivityKind::NameChanged, ActivityDetails::NameChange { new_name, .. }) => {
                format!("changed name to \"{new_name}\"")
            }
            (ActivityKind::NameChanged, _) => "changed their name".to_string(),
        }
    }

    // Newest first; id breaks ties so every replica agrees on the order
    fn recency_key(&self) -> (Timestamp, &EventId) {
        (self.timestamp, &self.id)
    }
}

/// Capped, newest-first activity feed
#[derive(Debug, Clone)]
pub struct ActivityLog {
    events: Vec<ActivityEvent>,
    limit: usize,
}

impl ActivityLog {
    pub fn new(limit: usize) -> Self {
        Self {
            events: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.events.iter().any(|e| &e.id == id)
    }

    /// Events, newest first
    pub fn events(&self) -> &[ActivityEvent] {
        &self.events
    }

    /// Insert one event. Returns false for a duplicate id or when the event is
    /// older than everything in a full feed.
    pub fn insert(&mut self, event: ActivityEvent) -> bool {
        if self.contains(&event.id) {
            return false;
        }
        let id = event.id.clone();
        let pos = self
            .events
            .partition_point(|e| e.recency_key() > event.recency_key());
        self.events.insert(pos, event);
        self.events.truncate(self.limit);
        self.contains(&id)
    }

    /// Union with incoming events, then re-sort and truncate.
    ///
    /// Returns how many of the incoming events survived the cap.
    pub fn merge(&mut self, incoming: Vec<ActivityEvent>) -> usize {
        let mut known: HashSet<EventId> = self.events.iter().map(|e| e.id.clone()).collect();
        let mut added = Vec::new();
        for event in incoming {
            if known.insert(event.id.clone()) {
                added.push(event.id.clone());
                self.events.push(event);
            }
        }
        if added.is_empty() {
            return 0;
        }
        self.events
            .sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
        self.events.truncate(self.limit);
        added.iter().filter(|id| self.contains(id)).count()
    }

    /// Local-only wipe of the feed
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
