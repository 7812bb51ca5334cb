//! Core types shared by every session component

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh, globally unique identifier
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "{}"), Ulid::new().to_string().to_lowercase()))
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Stable identifier of one session participant.
    ///
    /// Generated once per identity and persisted through the
    /// [`IdentityStore`](crate::identity::IdentityStore).
    PeerId,
    "user_"
);

string_id!(
    /// Identifier of a chat message (origin-stamped, globally unique)
    MessageId,
    "msg_"
);

string_id!(
    /// Identifier of an activity feed entry
    EventId,
    "evt_"
);

string_id!(
    /// Identifier of a bus envelope, used for bus-level deduplication
    EnvelopeId,
    "env_"
);

/// UI theme shared across the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            other => Err(format!("unknown theme: {other}")),
        }
    }
}

/// Identity snapshot of whoever authored a record.
///
/// Captured at the moment of authorship; later renames of the peer do not
/// touch records that already carry an `Actor`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: PeerId,
    pub name: String,
    pub color: String,
    pub avatar: String,
}

/// Pointer position of a peer, in the coordinates of whatever surface hosts the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
    /// Element the pointer is over, if known
    pub element_id: Option<String>,
}

impl CursorPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            element_id: None,
        }
    }
}

/// Which element a peer currently has focused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusState {
    pub element_id: Option<String>,
    pub element_type: Option<String>,
}
