//! Session events and connection status
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ConnectionStatus: can this peer reach the bus?                 │
//! │  ├── Connected                                                  │
//! │  └── Disconnected: last post failed, with the error message     │
//! │                                                                 │
//! │  SessionEvent: notifications for whatever renders the session   │
//! │  ├── Peer*: presence table changed                              │
//! │  ├── Message*: chat log changed                                 │
//! │  ├── CounterChanged / ThemeChanged / ActivityRecorded           │
//! │  └── Synced / InitializationFinished / StatusChanged            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use crate::activity::ActivityEvent;
use crate::counter::CounterState;
use crate::types::{MessageId, PeerId, Theme};

/// Whether the bus accepted our last post
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Connected,
    Disconnected(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Disconnected(msg) => write!(f, "Disconnected: {}", msg),
        }
    }
}

/// Why a peer left the presence table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// Explicit `user:leave`
    Left,
    /// No heartbeat within the user timeout
    TimedOut,
}

/// Events emitted by a session engine
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PeerJoined { peer_id: PeerId },
    PeerLeft { peer_id: PeerId, reason: LeaveReason },
    PeerUpdated { peer_id: PeerId },
    MessageAdded { message_id: MessageId },
    MessageRemoved { message_id: MessageId },
    MessagesCleared,
    CounterChanged(CounterState),
    ThemeChanged(Theme),
    ActivityRecorded(ActivityEvent),
    /// A state sync from `from` was merged
    Synced { from: PeerId },
    /// The initializing flag dropped, via a sync or the timeout
    InitializationFinished { via_sync: bool },
    StatusChanged(ConnectionStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Connected.to_string(), "Connected");
        let down = ConnectionStatus::Disconnected("bus gone".into());
        assert_eq!(down.to_string(), "Disconnected: bus gone");
        assert!(!down.is_connected());
        assert!(ConnectionStatus::default().is_connected());
    }
}
