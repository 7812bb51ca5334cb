//! Local peer identity and its persistence
//!
//! An identity (id, name, color, avatar) is scoped to a channel name and
//! survives restarts through an injected [`IdentityStore`]. The engine never
//! touches global storage directly.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SyncResult;
use crate::types::PeerId;

/// Peer colors, one picked at random per new identity
pub const COLORS: [&str; 17] = [
    "#ef4444", "#f97316", "#f59e0b", "#eab308", "#84cc16", "#22c55e", "#10b981", "#14b8a6",
    "#06b6d4", "#0ea5e9", "#3b82f6", "#6366f1", "#8b5cf6", "#a855f7", "#d946ef", "#ec4899",
    "#f43f5e",
];

/// Avatar glyphs, one picked at random per new identity
pub const AVATARS: [&str; 20] = [
    "👤", "😀", "😎", "🤓", "🧑‍💻", "👨‍💻", "👩‍💻", "🦊", "🐱", "🐶", "🐼", "🦁", "🐯", "🐨", "🐸",
    "🦄", "🐙", "🦋", "🌟", "🔥",
];

pub fn random_color() -> String {
    let i = rand::rng().random_range(0..COLORS.len());
    COLORS[i].to_string()
}

pub fn random_avatar() -> String {
    let i = rand::rng().random_range(0..AVATARS.len());
    AVATARS[i].to_string()
}

/// `User NNN` with NNN in 0..1000
pub fn default_user_name() -> String {
    format!("User {}", rand::rng().random_range(0..1000))
}

/// Persisted identity of the local peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub peer_id: PeerId,
    pub name: String,
    pub color: String,
    pub avatar: String,
}

impl Identity {
    /// A brand new random identity
    pub fn generate(name: Option<&str>) -> Self {
        Self {
            peer_id: PeerId::generate(),
            name: name
                .map(str::to_string)
                .unwrap_or_else(default_user_name),
            color: random_color(),
            avatar: random_avatar(),
        }
    }

    /// Load the identity stored for `channel`, or create and save a new one.
    ///
    /// Returns the identity and whether it was newly created. `preferred_name`
    /// only applies to a new identity; `avatar_override` always wins over the
    /// stored avatar.
    pub fn load_or_create(
        store: &dyn IdentityStore,
        channel: &str,
        preferred_name: Option<&str>,
        avatar_override: Option<&str>,
    ) -> SyncResult<(Self, bool)> {
        let (mut identity, is_new) = match store.load(channel)? {
            Some(identity) => {
                debug!(channel, peer = %identity.peer_id, "Recovered stored identity");
                (identity, false)
            }
            None => {
                let identity = Self::generate(preferred_name);
                info!(channel, peer = %identity.peer_id, name = %identity.name, "Created new identity");
                (identity, true)
            }
        };

        let mut dirty = is_new;
        if let Some(avatar) = avatar_override {
            if identity.avatar != avatar {
                identity.avatar = avatar.to_string();
                dirty = true;
            }
        }
        if dirty {
            store.save(channel, &identity)?;
        }
        Ok((identity, is_new))
    }
}

/// Load/save/clear of the local identity, keyed by channel name
pub trait IdentityStore: Send + Sync {
    fn load(&self, channel: &str) -> SyncResult<Option<Identity>>;
    fn save(&self, channel: &str, identity: &Identity) -> SyncResult<()>;
    fn clear(&self, channel: &str) -> SyncResult<()>;
}

/// In-memory store; identities live as long as the store does
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<String, Identity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self, channel: &str) -> SyncResult<Option<Identity>> {
        Ok(self.identities.read().get(channel).cloned())
    }

    fn save(&self, channel: &str, identity: &Identity) -> SyncResult<()> {
        self.identities
            .write()
            .insert(channel.to_string(), identity.clone());
        Ok(())
    }

    fn clear(&self, channel: &str) -> SyncResult<()> {
        self.identities.write().remove(channel);
        Ok(())
    }
}
