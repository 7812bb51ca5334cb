//! Broadcast synchronization layer
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  LocalBus (named channels, fan-out, no acknowledgment)          │
//! │  ├── BusHandle: post envelopes, ping, simulate transport loss   │
//! │  └── BusReceiver: filter, deduplicate and batch inbound frames  │
//! │                                                                 │
//! │  SessionRuntime (one task per peer)                             │
//! │  ├── owns the SessionEngine                                     │
//! │  ├── selects over bus batches, commands and timer deadlines     │
//! │  └── SessionHandle: cloneable async front door                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let bus = LocalBus::new();
//! let (handle, receiver) = bus.connect(
//!     config.bus_channel(),
//!     identity.peer_id.clone(),
//!     &MessageType::ALL,
//!     config.bus.clone(),
//!     clock.clone(),
//! );
//! let engine = SessionEngine::new(config, store, Arc::new(handle.clone()), clock)?;
//! let session = SessionRuntime::spawn(engine, handle, receiver);
//!
//! session.send_message("hello", None).await?;
//! let view = session.view().await?;
//! ```

pub mod bus;
pub mod events;
pub mod protocol;
pub mod runtime;

pub use bus::{BroadcastBus, BusHandle, BusReceiver, LocalBus};
pub use events::{ConnectionStatus, LeaveReason, SessionEvent};
pub use protocol::{Envelope, MessageType, SessionMessage, StateSnapshot, WireMessage};
pub use runtime::{SessionHandle, SessionRuntime};
