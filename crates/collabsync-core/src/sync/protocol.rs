//! Session sync protocol
//!
//! Messages are wrapped in an [`Envelope`], serialized with postcard and
//! broadcast on the bus.
//!
//! ## Protocol Overview
//!
//! 1. **Join**: a new peer broadcasts `user:join` and `state:request`
//! 2. **Heartbeat**: every peer re-broadcasts its snapshot periodically
//! 3. **StateSync**: every peer that sees a request replies with its full view
//! 4. **Deltas**: chat, counter, theme and activity changes are broadcast as
//!    they happen
//!
//! ## Message Flow
//!
//! ```text
//! Peer C (new)                    Peer A / Peer B
//!   |                               |
//!   |--- user:join {C} ------------>|
//!   |--- state:request {C} -------->|
//!   |<-- user:heartbeat {A} --------|  (A did not know C)
//!   |<-- state:sync {from A} -------|
//!   |<-- state:sync {from B} -------|  (every peer replies)
//!   |                               |
//!   |    (merge all snapshots)      |
//! ```

use serde::{Deserialize, Serialize};

use crate::activity::ActivityEvent;
use crate::chat::ChatMessage;
use crate::counter::CounterState;
use crate::presence::{Peer, PeerUpdate};
use crate::types::{CursorPosition, EnvelopeId, FocusState, MessageId, PeerId, Theme};

/// Every message type the session puts on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "user:join")]
    UserJoin,
    #[serde(rename = "user:leave")]
    UserLeave,
    #[serde(rename = "user:update")]
    UserUpdate,
    #[serde(rename = "user:typing")]
    UserTyping,
    #[serde(rename = "user:heartbeat")]
    UserHeartbeat,
    #[serde(rename = "user:cursor")]
    UserCursor,
    #[serde(rename = "user:focus")]
    UserFocus,
    #[serde(rename = "chat:message")]
    ChatMessage,
    #[serde(rename = "chat:delete")]
    ChatDelete,
    #[serde(rename = "chat:clear")]
    ChatClear,
    #[serde(rename = "counter:update")]
    CounterUpdate,
    #[serde(rename = "theme:update")]
    ThemeUpdate,
    #[serde(rename = "activity:event")]
    ActivityEvent,
    #[serde(rename = "state:request")]
    StateRequest,
    #[serde(rename = "state:sync")]
    StateSync,
}

impl MessageType {
    /// All types, in registration order
    pub const ALL: [MessageType; 15] = [
        MessageType::UserJoin,
        MessageType::UserLeave,
        MessageType::UserUpdate,
        MessageType::UserTyping,
        MessageType::UserHeartbeat,
        MessageType::UserCursor,
        MessageType::UserFocus,
        MessageType::ChatMessage,
        MessageType::ChatDelete,
        MessageType::ChatClear,
        MessageType::CounterUpdate,
        MessageType::ThemeUpdate,
        MessageType::ActivityEvent,
        MessageType::StateRequest,
        MessageType::StateSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::UserJoin => "user:join",
            MessageType::UserLeave => "user:leave",
            MessageType::UserUpdate => "user:update",
            MessageType::UserTyping => "user:typing",
            MessageType::UserHeartbeat => "user:heartbeat",
            MessageType::UserCursor => "user:cursor",
            MessageType::UserFocus => "user:focus",
            MessageType::ChatMessage => "chat:message",
            MessageType::ChatDelete => "chat:delete",
            MessageType::ChatClear => "chat:clear",
            MessageType::CounterUpdate => "counter:update",
            MessageType::ThemeUpdate => "theme:update",
            MessageType::ActivityEvent => "activity:event",
            MessageType::StateRequest => "state:request",
            MessageType::StateSync => "state:sync",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full local view sent in reply to a state request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Peer that produced the snapshot
    pub from: PeerId,
    /// Peer whose request this answers
    pub requester: PeerId,
    /// Every peer the sender knows, itself included
    pub peers: Vec<Peer>,
    /// Live (non-expired) messages only
    pub messages: Vec<ChatMessage>,
    pub counter: CounterState,
    pub theme: Theme,
    pub activity: Vec<ActivityEvent>,
}

/// Messages broadcast between session peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionMessage {
    UserJoin(Peer),
    UserLeave { peer_id: PeerId },
    UserUpdate(PeerUpdate),
    UserTyping { peer_id: PeerId, is_typing: bool },
    UserHeartbeat(Peer),
    UserCursor { peer_id: PeerId, cursor: Option<CursorPosition> },
    UserFocus { peer_id: PeerId, focus: Option<FocusState> },
    ChatMessage(ChatMessage),
    ChatDelete { message_id: MessageId },
    ChatClear,
    CounterUpdate(CounterState),
    ThemeUpdate { theme: Theme },
    ActivityEvent(ActivityEvent),
    StateRequest { requester: PeerId },
    StateSync(StateSnapshot),
}

impl SessionMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            SessionMessage::UserJoin(_) => MessageType::UserJoin,
            SessionMessage::UserLeave { .. } => MessageType::UserLeave,
            SessionMessage::UserUpdate(_) => MessageType::UserUpdate,
            SessionMessage::UserTyping { .. } => MessageType::UserTyping,
            SessionMessage::UserHeartbeat(_) => MessageType::UserHeartbeat,
            SessionMessage::UserCursor { .. } => MessageType::UserCursor,
            SessionMessage::UserFocus { .. } => MessageType::UserFocus,
            SessionMessage::ChatMessage(_) => MessageType::ChatMessage,
            SessionMessage::ChatDelete { .. } => MessageType::ChatDelete,
            SessionMessage::ChatClear => MessageType::ChatClear,
            SessionMessage::CounterUpdate(_) => MessageType::CounterUpdate,
            SessionMessage::ThemeUpdate { .. } => MessageType::ThemeUpdate,
            SessionMessage::ActivityEvent(_) => MessageType::ActivityEvent,
            SessionMessage::StateRequest { .. } => MessageType::StateRequest,
            SessionMessage::StateSync(_) => MessageType::StateSync,
        }
    }
}

/// A message plus the bus metadata needed for filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique per post, used for bus-level deduplication
    pub id: EnvelopeId,
    /// Peer that posted the message
    pub origin: PeerId,
    pub message: SessionMessage,
}

impl Envelope {
    pub fn new(origin: PeerId, message: SessionMessage) -> Self {
        Self {
            id: EnvelopeId::generate(),
            origin,
            message,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message.message_type()
    }
}

/// Wrapper for versioned messages
///
/// New versions can be added as variants without breaking existing peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMessage {
    /// Protocol version 1
    V1(Envelope),
}

impl WireMessage {
    pub fn new(envelope: Envelope) -> Self {
        WireMessage::V1(envelope)
    }

    /// Encode wire message to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode wire message from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    pub fn into_inner(self) -> Envelope {
        match self {
            WireMessage::V1(envelope) => envelope,
        }
    }

    pub fn version(&self) -> u8 {
        match self {
            WireMessage::V1(_) => 1,
        }
    }
}
