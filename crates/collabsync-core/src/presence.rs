//! Presence tracking
//!
//! The presence table holds every remote peer this peer currently considers
//! alive. Peers enter through a join, a heartbeat or a state sync, and leave
//! through an explicit leave notice or the timeout sweep. The local peer is
//! never stored here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{Actor, CursorPosition, FocusState, PeerId, Timestamp};

/// One session participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
    pub color: String,
    pub avatar: String,
    pub joined_at: Timestamp,
    pub last_seen: Timestamp,
    pub is_typing: bool,
    pub cursor: Option<CursorPosition>,
    pub focus: Option<FocusState>,
}

impl Peer {
    /// Identity snapshot for authoring records
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Partial update of a peer's profile fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerUpdate {
    pub id: PeerId,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub color: Option<String>,
}

impl PeerUpdate {
    /// An update for `id` that changes nothing yet
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            name: None,
            avatar: None,
            color: None,
        }
    }
}

/// What a join did to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Newly inserted; the caller should answer with a heartbeat
    Inserted,
    /// Already known; only `last_seen` moved
    Refreshed,
    /// Our own id echoed back
    Ignored,
}

/// Remote peers keyed by id
#[derive(Debug)]
pub struct PresenceTable {
    local_id: PeerId,
    peers: HashMap<PeerId, Peer>,
}

impl PresenceTable {
    pub fn new(local_id: PeerId) -> Self {
        Self {
            local_id,
            peers: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn get(&self, id: &PeerId) -> Option<&Peer> {
        self.peers.get(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Peers in join order (id breaks ties)
    pub fn list(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        peers
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.list().into_iter().map(|p| p.id).collect()
    }

    /// Handle a join notice
    pub fn on_join(&mut self, mut peer: Peer, now: Timestamp) -> JoinOutcome {
        if peer.id == self.local_id {
            return JoinOutcome::Ignored;
        }
        if let Some(existing) = self.peers.get_mut(&peer.id) {
            existing.last_seen = now;
            return JoinOutcome::Refreshed;
        }
        info!(peer = %peer.id, name = %peer.name, "Peer joined");
        peer.last_seen = now;
        self.peers.insert(peer.id.clone(), peer);
        JoinOutcome::Inserted
    }

    /// Handle a heartbeat: upsert the full snapshot. Returns true if the peer
    /// was not known before.
    pub fn on_heartbeat(&mut self, mut peer: Peer, now: Timestamp) -> bool {
        if peer.id == self.local_id {
            return false;
        }
        peer.last_seen = now;
        let is_new = match self.peers.get(&peer.id) {
            // Keep the join time we first recorded
            Some(existing) => {
                peer.joined_at = existing.joined_at;
                false
            }
            None => {
                debug!(peer = %peer.id, "Discovered peer via heartbeat");
                true
            }
        };
        self.peers.insert(peer.id.clone(), peer);
        is_new
    }

    /// Handle an explicit leave notice
    pub fn on_leave(&mut self, id: &PeerId) -> Option<Peer> {
        let removed = self.peers.remove(id);
        if removed.is_some() {
            info!(peer = %id, "Peer left");
        }
        removed
    }

    /// Merge profile fields into a known peer. Unknown ids are ignored.
    pub fn on_update(&mut self, update: &PeerUpdate, now: Timestamp) -> bool {
        let Some(peer) = self.peers.get_mut(&update.id) else {
            return false;
        };
        if let Some(name) = &update.name {
            peer.name = name.clone();
        }
        if let Some(avatar) = &update.avatar {
            peer.avatar = avatar.clone();
        }
        if let Some(color) = &update.color {
            peer.color = color.clone();
        }
        peer.last_seen = now;
        true
    }

    fn touch_with(&mut self, id: &PeerId, now: Timestamp, f: impl FnOnce(&mut Peer)) -> bool {
        match self.peers.get_mut(id) {
            Some(peer) => {
                f(peer);
                peer.last_seen = now;
                true
            }
            None => false,
        }
    }

    pub fn set_typing(&mut self, id: &PeerId, is_typing: bool, now: Timestamp) -> bool {
        self.touch_with(id, now, |p| p.is_typing = is_typing)
    }

    pub fn set_cursor(&mut self, id: &PeerId, cursor: Option<CursorPosition>, now: Timestamp) -> bool {
        self.touch_with(id, now, |p| p.cursor = cursor)
    }

    pub fn set_focus(&mut self, id: &PeerId, focus: Option<FocusState>, now: Timestamp) -> bool {
        self.touch_with(id, now, |p| p.focus = focus)
    }

    /// Add peers from a state sync. Known peers and our own id are skipped
    /// (first-seen wins). Returns the ids that were added.
    pub fn merge_snapshot(&mut self, peers: Vec<Peer>) -> Vec<PeerId> {
        let mut added = Vec::new();
        for peer in peers {
            if peer.id == self.local_id || self.peers.contains_key(&peer.id) {
                continue;
            }
            added.push(peer.id.clone());
            self.peers.insert(peer.id.clone(), peer);
        }
        added
    }

    /// Remove every peer whose `last_seen` is at least `timeout_ms` old
    pub fn sweep(&mut self, now: Timestamp, timeout_ms: i64) -> Vec<Peer> {
        let expired: Vec<PeerId> = self
            .peers
            .values()
            .filter(|p| now - p.last_seen >= timeout_ms)
            .map(|p| p.id.clone())
            .collect();

        let mut removed: Vec<Peer> = expired
            .iter()
            .filter_map(|id| self.peers.remove(id))
            .collect();
        removed.sort_by(|a, b| a.id.cmp(&b.id));
        for peer in &removed {
            info!(peer = %peer.id, idle_ms = now - peer.last_seen, "Peer timed out");
        }
        removed
    }
}
