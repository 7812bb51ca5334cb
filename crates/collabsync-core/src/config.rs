//! Configuration for a collaborative session
//!
//! All intervals are stored in milliseconds so a config file stays readable
//! as plain JSON. Accessors hand out [`Duration`]s.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::sync::protocol::MessageType;
use crate::types::Theme;

pub const DEFAULT_CHANNEL: &str = "collaborative-session";
pub const DEFAULT_NAMESPACE: &str = "collab";
pub const DEFAULT_HEARTBEAT_MS: u64 = 5_000;
pub const DEFAULT_ACTIVITY_LIMIT: usize = 50;

/// Per-peer session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Channel name shared by every peer in the session
    pub channel_name: String,

    /// Namespace prefix for the bus channel
    pub namespace: String,

    /// Preferred display name (used only when creating a new identity)
    pub user_name: Option<String>,

    /// Avatar override. Wins over a stored avatar.
    pub avatar: Option<String>,

    /// Theme held before any sync adopts a remote one
    pub initial_theme: Theme,

    /// Maximum number of activity events retained
    pub activity_feed_limit: usize,

    pub heartbeat_interval_ms: u64,

    /// Age of `last_seen` after which a peer is removed
    pub user_timeout_ms: u64,

    /// How long the "initializing" flag waits for a state sync
    pub initialization_timeout_ms: u64,

    pub cursor_debounce_ms: u64,
    pub typing_debounce_ms: u64,

    /// Period of the local chat expiry sweep
    pub message_expiry_check_ms: u64,

    /// Bus liveness probe timeout
    pub ping_timeout_ms: u64,

    pub bus: BusConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            user_name: None,
            avatar: None,
            initial_theme: Theme::System,
            activity_feed_limit: DEFAULT_ACTIVITY_LIMIT,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_MS,
            // 2.5x heartbeat
            user_timeout_ms: DEFAULT_HEARTBEAT_MS * 5 / 2,
            initialization_timeout_ms: 1_000,
            cursor_debounce_ms: 50,
            typing_debounce_ms: 300,
            message_expiry_check_ms: 1_000,
            ping_timeout_ms: 500,
            bus: BusConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Config for a named channel with every other setting at its default
    pub fn for_channel(channel: impl Into<String>) -> Self {
        Self {
            channel_name: channel.into(),
            ..Self::default()
        }
    }

    /// Load config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> SyncResult<()> {
        if self.channel_name.trim().is_empty() {
            return Err(SyncError::Config("channel_name cannot be empty".into()));
        }
        if self.activity_feed_limit == 0 {
            return Err(SyncError::Config(
                "activity_feed_limit must be at least 1".into(),
            ));
        }
        let intervals = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("initialization_timeout_ms", self.initialization_timeout_ms),
            ("cursor_debounce_ms", self.cursor_debounce_ms),
            ("typing_debounce_ms", self.typing_debounce_ms),
            ("message_expiry_check_ms", self.message_expiry_check_ms),
            ("ping_timeout_ms", self.ping_timeout_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(SyncError::Config(format!("{name} must be non-zero")));
        }
        if self.user_timeout_ms <= self.heartbeat_interval_ms {
            return Err(SyncError::Config(format!(
                "user_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.user_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        self.bus.validate()
    }

    /// Bus channel key, `namespace:channel`
    pub fn bus_channel(&self) -> String {
        format!("{}:{}", self.namespace, self.channel_name)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn user_timeout(&self) -> Duration {
        Duration::from_millis(self.user_timeout_ms)
    }

    pub fn initialization_timeout(&self) -> Duration {
        Duration::from_millis(self.initialization_timeout_ms)
    }

    pub fn cursor_debounce(&self) -> Duration {
        Duration::from_millis(self.cursor_debounce_ms)
    }

    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }

    pub fn message_expiry_check(&self) -> Duration {
        Duration::from_millis(self.message_expiry_check_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

/// Broadcast bus tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// How long a seen envelope id suppresses duplicates
    pub dedup_ttl_ms: u64,

    /// How often the seen-id cache is pruned
    pub cleaning_interval_ms: u64,

    /// Collection window after the first frame of a batch
    pub batching_delay_ms: u64,

    /// Message types delivered without waiting for a batch
    pub batching_excluded: Vec<MessageType>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dedup_ttl_ms: 1_000,
            cleaning_interval_ms: 2_000,
            batching_delay_ms: 20,
            batching_excluded: vec![MessageType::UserCursor, MessageType::UserTyping],
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> SyncResult<()> {
        if self.dedup_ttl_ms == 0 {
            return Err(SyncError::Config("dedup_ttl_ms must be non-zero".into()));
        }
        if self.cleaning_interval_ms == 0 {
            return Err(SyncError::Config(
                "cleaning_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn batching_delay(&self) -> Duration {
        Duration::from_millis(self.batching_delay_ms)
    }
}
