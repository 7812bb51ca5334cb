//! Collabsync Core Library
//!
//! Serverless collaborative sessions: peers on one broadcast channel keep a
//! shared view of who is present, an ephemeral chat, a shared counter, a
//! theme and an activity feed, with no server holding the truth.
//!
//! ## Overview
//!
//! - **Presence**: join notices, periodic heartbeats, timeout sweeps
//! - **Reconciliation**: a joining peer asks for state and merges every reply
//! - **Shared state**: last-writer-wins counter, union-merged chat and feed
//! - **Signals**: debounced typing and cursor, immediate focus
//!
//! ## Quick Start
//!
//! ```ignore
//! use collabsync_core::{LocalBus, MessageType, SessionConfig, SessionEngine, SessionRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::for_channel("standup");
//!     let store = Arc::new(MemoryIdentityStore::new());
//!     let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
//!     let (identity, _) = Identity::load_or_create(store.as_ref(), &config.channel_name, None, None)?;
//!
//!     let bus = LocalBus::new();
//!     let (handle, receiver) = bus.connect(
//!         config.bus_channel(),
//!         identity.peer_id,
//!         &MessageType::ALL,
//!         config.bus.clone(),
//!         clock.clone(),
//!     );
//!     let engine = SessionEngine::new(config, store, Arc::new(handle.clone()), clock)?;
//!     let session = SessionRuntime::spawn(engine, handle, receiver);
//!
//!     session.send_message("hello", None).await?;
//!     session.increment_counter().await?;
//!     println!("{:#?}", session.view().await?);
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod chat;
pub mod clock;
pub mod config;
pub mod counter;
pub mod engine;
pub mod error;
pub mod identity;
pub mod logging;
pub mod presence;
pub mod reconcile;
pub mod scheduler;
pub mod signals;
pub mod storage;
pub mod sync;
pub mod types;

// Re-exports
pub use activity::{ActivityDetails, ActivityEvent, ActivityKind, ActivityLog};
pub use chat::{ChatMessage, MessageStore};
pub use clock::{format_relative, Clock, ManualClock, SystemClock, TokioClock};
pub use config::{BusConfig, SessionConfig, DEFAULT_CHANNEL};
pub use counter::{CounterAction, CounterState, SharedCounter};
pub use engine::{SessionEngine, SessionView, Timer};
pub use error::{SyncError, SyncResult};
pub use identity::{Identity, IdentityStore, MemoryIdentityStore};
pub use presence::{Peer, PeerUpdate, PresenceTable};
pub use reconcile::{MergeReport, Reconciler, Replica};
pub use storage::RedbIdentityStore;
pub use sync::{
    BroadcastBus, BusHandle, BusReceiver, ConnectionStatus, Envelope, LeaveReason, LocalBus,
    MessageType, SessionEvent, SessionHandle, SessionMessage, SessionRuntime, StateSnapshot,
    WireMessage,
};
pub use types::*;
