//! Shared counter with last-writer-wins resolution
//!
//! The counter is a single replicated integer. Every write carries a
//! [`LastAction`] stamped with the writer's clock and an inbound state only
//! replaces the held one if its action is strictly newer. Concurrent writes
//! at nearly the same time can lose a delta; that is accepted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Actor, Timestamp};

/// Kind of counter mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterAction {
    Increment,
    Decrement,
    Reset,
    Set,
}

impl CounterAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterAction::Increment => "increment",
            CounterAction::Decrement => "decrement",
            CounterAction::Reset => "reset",
            CounterAction::Set => "set",
        }
    }
}

/// Who changed the counter, how, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastAction {
    pub actor: Actor,
    pub action: CounterAction,
    pub previous_value: i64,
    pub new_value: i64,
    pub timestamp: Timestamp,
}

/// Replicated counter value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub value: i64,
    pub last_action: Option<LastAction>,
}

impl CounterState {
    /// Timestamp of the last action, if any
    pub fn stamp(&self) -> Option<Timestamp> {
        self.last_action.as_ref().map(|a| a.timestamp)
    }

    /// Whether `incoming` should replace `self`.
    ///
    /// Strictly newer action wins; ties keep the held state. A held state with
    /// no action yet yields to any incoming action.
    pub fn is_superseded_by(&self, incoming: &CounterState) -> bool {
        match (self.stamp(), incoming.stamp()) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(held), Some(new)) => new > held,
        }
    }
}

/// Result of a local counter mutation
#[derive(Debug, Clone)]
pub struct CounterChange {
    pub old_value: i64,
    pub new_value: i64,
    pub state: CounterState,
}

/// Local replica of the shared counter
#[derive(Debug, Default)]
pub struct SharedCounter {
    state: CounterState,
}

impl SharedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CounterState {
        &self.state
    }

    pub fn value(&self) -> i64 {
        self.state.value
    }

    /// Apply a local action and return the state to broadcast.
    ///
    /// The action timestamp is pushed past the held one so a local write
    /// always supersedes what this peer has already seen, even with a
    /// lagging clock.
    pub fn apply_local(
        &mut self,
        action: CounterAction,
        set_to: Option<i64>,
        actor: Actor,
        now: Timestamp,
    ) -> CounterChange {
        let old_value = self.state.value;
        let new_value = match action {
            CounterAction::Increment => old_value.saturating_add(1),
            CounterAction::Decrement => old_value.saturating_sub(1),
            CounterAction::Reset => 0,
            CounterAction::Set => set_to.unwrap_or(old_value),
        };
        let timestamp = match self.state.stamp() {
            Some(held) if held >= now => held.saturating_add(1),
            _ => now,
        };

        self.state = CounterState {
            value: new_value,
            last_action: Some(LastAction {
                actor,
                action,
                previous_value: old_value,
                new_value,
                timestamp,
            }),
        };

        CounterChange {
            old_value,
            new_value,
            state: self.state.clone(),
        }
    }

    /// Apply an inbound state. Returns true if it was adopted.
    pub fn apply_remote(&mut self, incoming: CounterState) -> bool {
        if self.state.is_superseded_by(&incoming) {
            debug!(
                value = incoming.value,
                stamp = ?incoming.stamp(),
                "Adopting newer counter state"
            );
            self.state = incoming;
            true
        } else {
            false
        }
    }
}
