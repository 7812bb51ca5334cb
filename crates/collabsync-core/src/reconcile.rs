//! Join-time state reconciliation
//!
//! A joining peer broadcasts `state:request`; every peer that sees it replies
//! with a [`StateSnapshot`] of its full local view. The joiner may get one
//! reply per existing peer and merges each of them, so every merge rule here
//! is idempotent:
//!
//! - peers: union by id, first-seen wins, own id excluded
//! - messages: union by id, expired ones dropped, re-sorted ascending
//! - counter: last-writer-wins on the action timestamp
//! - theme: adopted only from the first reply to our own request
//! - activity: union by id, re-sorted newest first, truncated to the cap
//!
//! Reconciliation is advisory. If nothing answers within the initialization
//! timeout the peer stops "initializing" and carries on with what it has.

use std::time::Duration;

use tracing::{debug, info};

use crate::activity::ActivityLog;
use crate::chat::MessageStore;
use crate::counter::SharedCounter;
use crate::presence::{Peer, PresenceTable};
use crate::scheduler::{Scheduler, TimerId};
use crate::sync::protocol::StateSnapshot;
use crate::types::{MessageId, PeerId, Theme, Timestamp};

/// The replicated slices of session state
#[derive(Debug)]
pub struct Replica {
    pub presence: PresenceTable,
    pub messages: MessageStore,
    pub counter: SharedCounter,
    pub theme: Theme,
    pub activity: ActivityLog,
}

impl Replica {
    pub fn new(local_id: PeerId, theme: Theme, activity_limit: usize) -> Self {
        Self {
            presence: PresenceTable::new(local_id),
            messages: MessageStore::new(),
            counter: SharedCounter::new(),
            theme,
            activity: ActivityLog::new(activity_limit),
        }
    }

    /// Full local view for a reply to `requester`.
    ///
    /// Includes the local peer and only messages still live at `now`.
    pub fn snapshot(&self, local: Peer, requester: PeerId, now: Timestamp) -> StateSnapshot {
        let from = local.id.clone();
        let mut peers = self.presence.list();
        peers.push(local);
        StateSnapshot {
            from,
            requester,
            peers,
            messages: self.messages.live(now),
            counter: self.counter.state().clone(),
            theme: self.theme,
            activity: self.activity.events().to_vec(),
        }
    }
}

/// What a merged snapshot changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub peers_added: Vec<PeerId>,
    pub messages_added: Vec<MessageId>,
    pub counter_adopted: bool,
    pub theme_adopted: Option<Theme>,
    pub activity_added: usize,
    /// This merge ended the initializing phase
    pub finished_initialization: bool,
}

impl MergeReport {
    pub fn changed_anything(&self) -> bool {
        !self.peers_added.is_empty()
            || !self.messages_added.is_empty()
            || self.counter_adopted
            || self.theme_adopted.is_some()
            || self.activity_added > 0
    }
}

/// Tracks the catch-up phase of one peer
#[derive(Debug)]
pub struct Reconciler {
    local_id: PeerId,
    initializing: bool,
    theme_adopted: bool,
    init_timer: Option<TimerId>,
    syncs_merged: usize,
}

impl Reconciler {
    pub fn new(local_id: PeerId) -> Self {
        Self {
            local_id,
            initializing: true,
            theme_adopted: false,
            init_timer: None,
            syncs_merged: 0,
        }
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    pub fn syncs_merged(&self) -> usize {
        self.syncs_merged
    }

    /// Arm the initialization timeout after sending our state request
    pub fn begin<T: Clone>(&mut self, scheduler: &mut Scheduler<T>, now: Timestamp, timeout: Duration, task: T) {
        if let Some(timer) = self.init_timer.take() {
            scheduler.cancel(timer);
        }
        self.init_timer = Some(scheduler.schedule_after(now, timeout, task));
    }

    /// The initialization timer fired. Returns true if this ended the phase.
    pub fn on_timeout(&mut self) -> bool {
        self.init_timer = None;
        if self.initializing {
            info!(peer = %self.local_id, "No state sync before timeout, continuing with local state");
            self.initializing = false;
            true
        } else {
            false
        }
    }

    /// Merge one snapshot into `replica`.
    ///
    /// Every snapshot is merged, whoever it answered. Only a reply to our own
    /// request can end the initializing phase or set the theme.
    pub fn merge<T: Clone>(
        &mut self,
        snapshot: StateSnapshot,
        replica: &mut Replica,
        scheduler: &mut Scheduler<T>,
        now: Timestamp,
    ) -> MergeReport {
        let for_us = snapshot.requester == self.local_id;
        let from = snapshot.from.clone();
        let mut report = MergeReport {
            peers_added: replica.presence.merge_snapshot(snapshot.peers),
            messages_added: replica.messages.merge(snapshot.messages, now),
            counter_adopted: replica.counter.apply_remote(snapshot.counter),
            theme_adopted: None,
            activity_added: replica.activity.merge(snapshot.activity),
            finished_initialization: false,
        };

        if for_us {
            if !self.theme_adopted {
                self.theme_adopted = true;
                if replica.theme != snapshot.theme {
                    replica.theme = snapshot.theme;
                    report.theme_adopted = Some(snapshot.theme);
                }
            }
            if let Some(timer) = self.init_timer.take() {
                scheduler.cancel(timer);
            }
            if self.initializing {
                self.initializing = false;
                report.finished_initialization = true;
            }
        }

        self.syncs_merged += 1;
        debug!(
            from = %from,
            for_us,
            peers = report.peers_added.len(),
            messages = report.messages_added.len(),
            counter = report.counter_adopted,
            activity = report.activity_added,
            "Merged state sync"
        );
        report
    }
}
