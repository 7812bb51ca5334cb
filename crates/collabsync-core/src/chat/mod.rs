//! Ephemeral chat
//!
//! Every peer holds its own replica of the chat log. Replicas converge by
//! union: messages are immutable after creation, so the only operations are
//! insert (deduplicated by id), delete by id, clear-all and local expiry.
//!
//! # Message Flow
//!
//! **Sending:**
//! 1. [`ChatMessage::compose`] trims the text and stamps id, author snapshot
//!    and optional expiry
//! 2. The message is inserted locally and broadcast as `chat:message`
//!
//! **Receiving:**
//! 1. `chat:message` inserts if the id is new and the message is not expired
//! 2. `state:sync` merges the sender's live messages the same way
//! 3. A one-second sweep drops expired messages locally; expiry is never
//!    broadcast

mod message;
mod store;

pub use message::{ChatMessage, PREVIEW_CHARS};
pub use store::MessageStore;
