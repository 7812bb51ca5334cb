//! Log records for the JSONL log files.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of a peer's JSONL log.
///
/// Every entry is self-contained, so files from many peers can be
/// concatenated and sorted by `ts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonLogEntry {
    /// RFC 3339 timestamp with milliseconds
    pub ts: String,

    /// trace, debug, info, warn or error
    pub level: String,

    /// Label of the peer that wrote the entry
    pub peer: String,

    /// Module path (e.g. "collabsync_core::engine")
    pub target: String,

    pub msg: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,

    /// Enclosing spans, root first, joined with " > "
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl JsonLogEntry {
    pub fn new(
        level: impl Into<String>,
        peer: impl Into<String>,
        target: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: level.into(),
            peer: peer.into(),
            target: target.into(),
            msg: msg.into(),
            fields: None,
            span: None,
        }
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }

    /// Look up a structured field rendered as a string
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.as_ref()?.get(name)?.as_str()
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Written once when a multi-peer run starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Start time, filesystem-safe
    pub run_id: String,
    pub started_at: String,
    /// Bus channel the peers joined
    pub channel: String,
    /// Labels of the participating peers
    pub peers: Vec<String>,
    pub cwd: Option<String>,
}

impl SessionMetadata {
    pub fn new(channel: impl Into<String>, peers: Vec<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            run_id: now.format("%Y-%m-%dT%H-%M-%S").to_string(),
            started_at: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            channel: channel.into(),
            peers,
            cwd: std::env::current_dir()
                .ok()
                .map(|p| p.display().to_string()),
        }
    }
}
