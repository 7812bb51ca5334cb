//! Per-peer JSONL logging.
//!
//! Each peer writes its own append-only file, so several peers in one process
//! (or several processes) never contend for a file.
//!
//! ```text
//! logs/
//! ├── raw/
//! │   ├── 2026-10-19_alice.jsonl
//! │   └── 2026-10-19_bob.jsonl
//! └── runs/
//!     └── 2026-10-19T14-13-48.json
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use collabsync_core::logging::LoggingBuilder;
//!
//! LoggingBuilder::new("alice", "collabsync_core=info")
//!     .with_jsonl("./logs")
//!     .init()?;
//! ```
//!
//! ### Querying with jq
//!
//! ```bash
//! # Dropped or failed broadcasts
//! jq 'select(.level == "warn")' logs/raw/*.jsonl
//!
//! # One timeline across peers
//! cat logs/raw/*.jsonl | jq -s 'sort_by(.ts)'
//! ```

pub mod entry;
pub mod layer;
pub mod writer;

pub use entry::{JsonLogEntry, SessionMetadata};
pub use layer::{JsonlLayer, LoggingBuilder};
pub use writer::{read_all_entries, read_peer_entries, write_session_metadata, PeerLogWriter};
