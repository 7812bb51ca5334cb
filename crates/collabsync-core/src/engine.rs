//! SessionEngine - the per-peer state machine
//!
//! SessionEngine owns every slice of session state for one peer and is the
//! single place where that state changes:
//! - inbound bus envelopes go through [`SessionEngine::handle_batch`]
//! - timers (heartbeat, sweeps, debounces) fire from
//!   [`SessionEngine::run_due_timers`]
//! - local actions (chat, counter, theme, profile) are plain methods
//!
//! The engine never sleeps and never reads ambient time. It is driven either
//! by a test with a [`ManualClock`](crate::clock::ManualClock) or by the
//! [`SessionRuntime`](crate::sync::SessionRuntime) control loop.
//!
//! # Example
//!
//! ```ignore
//! let bus = LocalBus::new();
//! let (handle, mut rx) = bus.connect(channel, id, &MessageType::ALL, config.bus.clone(), clock.clone());
//! let mut engine = SessionEngine::new(config, store, Arc::new(handle), clock)?;
//!
//! engine.announce_join();
//! engine.send_message("hello", None);
//! engine.handle_batch(rx.try_recv_batch());
//! engine.run_due_timers();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::activity::{ActivityDetails, ActivityEvent, ActivityKind};
use crate::chat::{ChatMessage, MessageStore};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::counter::{CounterAction, CounterState};
use crate::error::{SyncError, SyncResult};
use crate::identity::{Identity, IdentityStore};
use crate::presence::{JoinOutcome, Peer, PeerUpdate};
use crate::reconcile::{Reconciler, Replica};
use crate::scheduler::Scheduler;
use crate::signals::Debounced;
use crate::sync::bus::BroadcastBus;
use crate::sync::events::{ConnectionStatus, LeaveReason, SessionEvent};
use crate::sync::protocol::{Envelope, SessionMessage};
use crate::types::{Actor, CursorPosition, FocusState, MessageId, PeerId, Theme, Timestamp};

/// Default capacity for the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Timers owned by the engine's scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    Heartbeat,
    PresenceSweep,
    ExpirySweep,
    InitializationTimeout,
    TypingFlush,
    CursorFlush,
}

/// Everything a renderer needs, as of one instant
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    /// Remote peers in join order
    pub peers: Vec<Peer>,
    /// Live messages, oldest first
    pub messages: Vec<ChatMessage>,
    pub counter: CounterState,
    pub theme: Theme,
    /// Newest first
    pub activity: Vec<ActivityEvent>,
    pub current_user: Peer,
    pub status: ConnectionStatus,
    pub is_initializing: bool,
}

/// Collaborative session state machine for one peer
pub struct SessionEngine {
    config: SessionConfig,
    identity: Identity,
    is_new_identity: bool,
    store: Arc<dyn IdentityStore>,
    bus: Arc<dyn BroadcastBus>,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler<Timer>,
    replica: Replica,
    reconciler: Reconciler,
    joined_at: Timestamp,
    started: bool,
    // Local ephemeral signals
    is_typing: bool,
    cursor: Option<CursorPosition>,
    focus: Option<FocusState>,
    typing_signal: Debounced<bool>,
    cursor_signal: Debounced<Option<CursorPosition>>,
    status: ConnectionStatus,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionEngine {
    /// Build an engine, loading (or creating) the local identity from `store`.
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn IdentityStore>,
        bus: Arc<dyn BroadcastBus>,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let (identity, is_new_identity) = Identity::load_or_create(
            store.as_ref(),
            &config.channel_name,
            config.user_name.as_deref(),
            config.avatar.as_deref(),
        )?;
        Self::from_identity(config, identity, is_new_identity, store, bus, clock)
    }

    /// Build an engine around an identity the caller already loaded.
    ///
    /// Used when the bus connection needs the peer id before the engine
    /// exists. `is_new_identity` decides whether joining is logged as activity.
    pub fn from_identity(
        config: SessionConfig,
        identity: Identity,
        is_new_identity: bool,
        store: Arc<dyn IdentityStore>,
        bus: Arc<dyn BroadcastBus>,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let now = clock.now_ms();

        Ok(Self {
            replica: Replica::new(
                identity.peer_id.clone(),
                config.initial_theme,
                config.activity_feed_limit,
            ),
            reconciler: Reconciler::new(identity.peer_id.clone()),
            typing_signal: Debounced::new(config.typing_debounce()),
            cursor_signal: Debounced::new(config.cursor_debounce()),
            scheduler: Scheduler::new(),
            joined_at: now,
            started: false,
            is_typing: false,
            cursor: None,
            focus: None,
            status: ConnectionStatus::Connected,
            event_tx,
            config,
            identity,
            is_new_identity,
            store,
            bus,
            clock,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    pub fn peer_id(&self) -> &PeerId {
        &self.identity.peer_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Whether the identity was created by this engine rather than recovered
    pub fn is_new_identity(&self) -> bool {
        self.is_new_identity
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn is_initializing(&self) -> bool {
        self.reconciler.is_initializing()
    }

    pub fn theme(&self) -> Theme {
        self.replica.theme
    }

    pub fn counter(&self) -> &CounterState {
        self.replica.counter.state()
    }

    pub fn messages(&self) -> &MessageStore {
        &self.replica.messages
    }

    /// The local peer as other peers see it
    pub fn current_user(&self) -> Peer {
        Peer {
            id: self.identity.peer_id.clone(),
            name: self.identity.name.clone(),
            color: self.identity.color.clone(),
            avatar: self.identity.avatar.clone(),
            joined_at: self.joined_at,
            last_seen: self.clock.now_ms(),
            is_typing: self.is_typing,
            cursor: self.cursor.clone(),
            focus: self.focus.clone(),
        }
    }

    pub fn view(&self) -> SessionView {
        let now = self.clock.now_ms();
        SessionView {
            peers: self.replica.presence.list(),
            messages: self.replica.messages.live(now),
            counter: self.replica.counter.state().clone(),
            theme: self.replica.theme,
            activity: self.replica.activity.events().to_vec(),
            current_user: self.current_user(),
            status: self.status.clone(),
            is_initializing: self.reconciler.is_initializing(),
        }
    }

    /// Subscribe to session events
    ///
    /// Multiple subscribers can exist; events are broadcast to all.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.event_tx.clone()
    }

    /// Current time on the engine's clock
    pub fn now_ms(&self) -> Timestamp {
        self.clock.now_ms()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Announce this peer and ask existing peers for their state.
    ///
    /// Arms the heartbeat, presence sweep, expiry sweep and initialization
    /// timers. Calling it twice is a no-op.
    pub fn announce_join(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let now = self.clock.now_ms();
        info!(
            peer = %self.identity.peer_id,
            name = %self.identity.name,
            channel = %self.config.channel_name,
            new_identity = self.is_new_identity,
            "Joining session"
        );

        self.post(SessionMessage::UserJoin(self.current_user()));
        self.post(SessionMessage::StateRequest {
            requester: self.identity.peer_id.clone(),
        });
        if self.is_new_identity {
            self.record_activity(ActivityKind::UserJoined, ActivityDetails::None, true);
        }

        let heartbeat = self.config.heartbeat_interval();
        self.scheduler.schedule_every(now, heartbeat, Timer::Heartbeat);
        self.scheduler.schedule_every(now, heartbeat, Timer::PresenceSweep);
        self.scheduler
            .schedule_every(now, self.config.message_expiry_check(), Timer::ExpirySweep);
        self.reconciler.begin(
            &mut self.scheduler,
            now,
            self.config.initialization_timeout(),
            Timer::InitializationTimeout,
        );
    }

    /// Broadcast a leave notice and stop every timer
    pub fn leave(&mut self) {
        if !self.started {
            return;
        }
        info!(peer = %self.identity.peer_id, "Leaving session");
        self.post(SessionMessage::UserLeave {
            peer_id: self.identity.peer_id.clone(),
        });
        self.typing_signal.cancel(&mut self.scheduler);
        self.cursor_signal.cancel(&mut self.scheduler);
        self.scheduler.clear();
        self.started = false;
    }

    /// The host regained visibility or focus: heartbeat right away
    pub fn on_visibility_regained(&mut self) {
        self.post(SessionMessage::UserHeartbeat(self.current_user()));
    }

    /// Forget the stored identity. The next engine built on this store gets a
    /// fresh one; this engine keeps its current identity.
    pub fn reset_identity(&mut self) -> SyncResult<()> {
        info!(peer = %self.identity.peer_id, "Clearing stored identity");
        self.store.clear(&self.config.channel_name)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════

    /// Due time of the next timer, if any
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        self.scheduler.next_deadline()
    }

    /// Fire every timer due at the current clock time. Returns how many fired.
    pub fn run_due_timers(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut fired = 0;
        while let Some((_, timer)) = self.scheduler.pop_ready(now) {
            self.on_timer(timer, now);
            fired += 1;
        }
        fired
    }

    fn on_timer(&mut self, timer: Timer, now: Timestamp) {
        match timer {
            Timer::Heartbeat => {
                self.post(SessionMessage::UserHeartbeat(self.current_user()));
            }
            Timer::PresenceSweep => {
                let timeout_ms = self.config.user_timeout_ms as i64;
                for peer in self.replica.presence.sweep(now, timeout_ms) {
                    // Every peer detects the timeout itself; not broadcast
                    let event = ActivityEvent::new(
                        ActivityKind::UserLeft,
                        peer.actor(),
                        now,
                        ActivityDetails::None,
                    );
                    self.insert_activity(event);
                    self.emit(SessionEvent::PeerLeft {
                        peer_id: peer.id,
                        reason: LeaveReason::TimedOut,
                    });
                }
            }
            Timer::ExpirySweep => {
                for message_id in self.replica.messages.sweep_expired(now) {
                    self.emit(SessionEvent::MessageRemoved { message_id });
                }
            }
            Timer::InitializationTimeout => {
                if self.reconciler.on_timeout() {
                    self.emit(SessionEvent::InitializationFinished { via_sync: false });
                }
            }
            Timer::TypingFlush => {
                if let Some(is_typing) = self.typing_signal.take() {
                    self.post(SessionMessage::UserTyping {
                        peer_id: self.identity.peer_id.clone(),
                        is_typing,
                    });
                }
            }
            Timer::CursorFlush => {
                if let Some(cursor) = self.cursor_signal.take() {
                    self.post(SessionMessage::UserCursor {
                        peer_id: self.identity.peer_id.clone(),
                        cursor,
                    });
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Dispatcher
    // ═══════════════════════════════════════════════════════════════════════

    /// Apply a batch of inbound envelopes in order
    pub fn handle_batch(&mut self, batch: Vec<Envelope>) {
        for envelope in batch {
            self.handle(envelope);
        }
    }

    /// Route one inbound envelope to the component that owns it
    pub fn handle(&mut self, envelope: Envelope) {
        if envelope.origin == self.identity.peer_id {
            return;
        }
        let now = self.clock.now_ms();
        debug!(
            peer = %self.identity.peer_id,
            from = %envelope.origin,
            msg_type = %envelope.message_type(),
            "Handling message"
        );

        match envelope.message {
            SessionMessage::UserJoin(peer) => {
                let peer_id = peer.id.clone();
                if self.replica.presence.on_join(peer, now) == JoinOutcome::Inserted {
                    self.emit(SessionEvent::PeerJoined { peer_id });
                    // Lets the joiner discover us even if its state request is lost
                    self.post(SessionMessage::UserHeartbeat(self.current_user()));
                }
            }
            SessionMessage::UserLeave { peer_id } => {
                if self.replica.presence.on_leave(&peer_id).is_some() {
                    self.emit(SessionEvent::PeerLeft {
                        peer_id,
                        reason: LeaveReason::Left,
                    });
                }
            }
            SessionMessage::UserUpdate(update) => {
                if self.replica.presence.on_update(&update, now) {
                    self.emit(SessionEvent::PeerUpdated { peer_id: update.id });
                }
            }
            SessionMessage::UserTyping { peer_id, is_typing } => {
                if self.replica.presence.set_typing(&peer_id, is_typing, now) {
                    self.emit(SessionEvent::PeerUpdated { peer_id });
                }
            }
            SessionMessage::UserHeartbeat(peer) => {
                let peer_id = peer.id.clone();
                if peer_id == self.identity.peer_id {
                    return;
                }
                if self.replica.presence.on_heartbeat(peer, now) {
                    self.emit(SessionEvent::PeerJoined { peer_id });
                } else {
                    self.emit(SessionEvent::PeerUpdated { peer_id });
                }
            }
            SessionMessage::UserCursor { peer_id, cursor } => {
                if self.replica.presence.set_cursor(&peer_id, cursor, now) {
                    self.emit(SessionEvent::PeerUpdated { peer_id });
                }
            }
            SessionMessage::UserFocus { peer_id, focus } => {
                if self.replica.presence.set_focus(&peer_id, focus, now) {
                    self.emit(SessionEvent::PeerUpdated { peer_id });
                }
            }
            SessionMessage::ChatMessage(message) => {
                let message_id = message.id.clone();
                if self.replica.messages.insert(message, now) {
                    self.emit(SessionEvent::MessageAdded { message_id });
                }
            }
            SessionMessage::ChatDelete { message_id } => {
                if self.replica.messages.remove(&message_id).is_some() {
                    self.emit(SessionEvent::MessageRemoved { message_id });
                }
            }
            SessionMessage::ChatClear => {
                self.replica.messages.clear();
                self.emit(SessionEvent::MessagesCleared);
            }
            SessionMessage::CounterUpdate(state) => {
                if self.replica.counter.apply_remote(state) {
                    self.emit(SessionEvent::CounterChanged(self.replica.counter.state().clone()));
                }
            }
            SessionMessage::ThemeUpdate { theme } => {
                if self.replica.theme != theme {
                    self.replica.theme = theme;
                    self.emit(SessionEvent::ThemeChanged(theme));
                }
            }
            SessionMessage::ActivityEvent(event) => {
                self.insert_activity(event);
            }
            SessionMessage::StateRequest { requester } => {
                // Answered from whatever we hold, even mid-reconciliation
                let snapshot = self
                    .replica
                    .snapshot(self.current_user(), requester.clone(), now);
                debug!(
                    to = %requester,
                    peers = snapshot.peers.len(),
                    messages = snapshot.messages.len(),
                    "Answering state request"
                );
                self.post(SessionMessage::StateSync(snapshot));
            }
            SessionMessage::StateSync(snapshot) => {
                if snapshot.from == self.identity.peer_id {
                    return;
                }
                let from = snapshot.from.clone();
                let report =
                    self.reconciler
                        .merge(snapshot, &mut self.replica, &mut self.scheduler, now);
                for peer_id in report.peers_added {
                    self.emit(SessionEvent::PeerJoined { peer_id });
                }
                for message_id in report.messages_added {
                    self.emit(SessionEvent::MessageAdded { message_id });
                }
                if report.counter_adopted {
                    self.emit(SessionEvent::CounterChanged(self.replica.counter.state().clone()));
                }
                if let Some(theme) = report.theme_adopted {
                    self.emit(SessionEvent::ThemeChanged(theme));
                }
                if report.finished_initialization {
                    info!(peer = %self.identity.peer_id, from = %from, "Initial state synced");
                    self.emit(SessionEvent::InitializationFinished { via_sync: true });
                }
                self.emit(SessionEvent::Synced { from });
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Profile and Signals
    // ═══════════════════════════════════════════════════════════════════════

    /// Rename the local peer. Persisted, broadcast and logged.
    pub fn update_name(&mut self, name: &str) -> SyncResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::InvalidOperation("name cannot be empty".into()));
        }
        let old_name = self.identity.name.clone();
        let mut identity = self.identity.clone();
        identity.name = name.to_string();
        self.store.save(&self.config.channel_name, &identity)?;
        self.identity = identity;

        self.post(SessionMessage::UserUpdate(PeerUpdate {
            name: Some(name.to_string()),
            ..PeerUpdate::new(self.identity.peer_id.clone())
        }));
        self.record_activity(
            ActivityKind::NameChanged,
            ActivityDetails::NameChange {
                old_name,
                new_name: name.to_string(),
            },
            true,
        );
        Ok(())
    }

    /// Change the local avatar. Persisted and broadcast.
    pub fn update_avatar(&mut self, avatar: &str) -> SyncResult<()> {
        let mut identity = self.identity.clone();
        identity.avatar = avatar.to_string();
        self.store.save(&self.config.channel_name, &identity)?;
        self.identity = identity;

        self.post(SessionMessage::UserUpdate(PeerUpdate {
            avatar: Some(avatar.to_string()),
            ..PeerUpdate::new(self.identity.peer_id.clone())
        }));
        Ok(())
    }

    /// Set the local typing flag; the broadcast is debounced
    pub fn mark_typing(&mut self, is_typing: bool) {
        self.is_typing = is_typing;
        let now = self.clock.now_ms();
        self.typing_signal
            .stage(is_typing, &mut self.scheduler, now, Timer::TypingFlush);
    }

    /// Set the local cursor; the broadcast is debounced
    pub fn update_cursor(&mut self, cursor: Option<CursorPosition>) {
        self.cursor = cursor.clone();
        let now = self.clock.now_ms();
        self.cursor_signal
            .stage(cursor, &mut self.scheduler, now, Timer::CursorFlush);
    }

    /// Set the local focus and broadcast it immediately
    pub fn update_focus(&mut self, focus: Option<FocusState>) {
        self.focus = focus.clone();
        self.post(SessionMessage::UserFocus {
            peer_id: self.identity.peer_id.clone(),
            focus,
        });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Chat
    // ═══════════════════════════════════════════════════════════════════════

    /// Send a chat message, optionally expiring after `expires_in`.
    ///
    /// Returns `None` (and does nothing) when the text is blank.
    pub fn send_message(&mut self, text: &str, expires_in: Option<Duration>) -> Option<MessageId> {
        let now = self.clock.now_ms();
        let expires_in_ms = expires_in.map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        let message = ChatMessage::compose(self.actor(), text, now, expires_in_ms)?;
        let message_id = message.id.clone();
        let preview = message.preview();

        self.replica.messages.insert(message.clone(), now);
        self.post(SessionMessage::ChatMessage(message));
        self.mark_typing(false);
        self.record_activity(
            ActivityKind::MessageSent,
            ActivityDetails::MessagePreview { preview },
            true,
        );
        self.emit(SessionEvent::MessageAdded {
            message_id: message_id.clone(),
        });
        Some(message_id)
    }

    /// Delete a message here and everywhere. Returns true if it was held locally.
    pub fn delete_message(&mut self, message_id: &MessageId) -> bool {
        let removed = self.replica.messages.remove(message_id).is_some();
        self.post(SessionMessage::ChatDelete {
            message_id: message_id.clone(),
        });
        if removed {
            self.emit(SessionEvent::MessageRemoved {
                message_id: message_id.clone(),
            });
        }
        removed
    }

    /// Empty the chat log on every peer
    pub fn clear_messages(&mut self) {
        self.replica.messages.clear();
        self.post(SessionMessage::ChatClear);
        self.emit(SessionEvent::MessagesCleared);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Counter
    // ═══════════════════════════════════════════════════════════════════════

    pub fn increment_counter(&mut self) -> CounterState {
        self.counter_action(CounterAction::Increment, None)
    }

    pub fn decrement_counter(&mut self) -> CounterState {
        self.counter_action(CounterAction::Decrement, None)
    }

    pub fn reset_counter(&mut self) -> CounterState {
        self.counter_action(CounterAction::Reset, None)
    }

    pub fn set_counter(&mut self, value: i64) -> CounterState {
        self.counter_action(CounterAction::Set, Some(value))
    }

    fn counter_action(&mut self, action: CounterAction, set_to: Option<i64>) -> CounterState {
        let now = self.clock.now_ms();
        let change = self
            .replica
            .counter
            .apply_local(action, set_to, self.actor(), now);
        debug!(
            action = action.as_str(),
            old = change.old_value,
            new = change.new_value,
            "Counter changed locally"
        );
        self.post(SessionMessage::CounterUpdate(change.state.clone()));
        self.record_activity(
            ActivityKind::CounterChanged,
            ActivityDetails::CounterChange {
                old_value: change.old_value,
                new_value: change.new_value,
            },
            true,
        );
        self.emit(SessionEvent::CounterChanged(change.state.clone()));
        change.state
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Theme and Activity
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_theme(&mut self, theme: Theme) {
        let old_theme = self.replica.theme;
        self.replica.theme = theme;
        self.post(SessionMessage::ThemeUpdate { theme });
        self.record_activity(
            ActivityKind::ThemeChanged,
            ActivityDetails::ThemeChange {
                old_theme,
                new_theme: theme,
            },
            true,
        );
        self.emit(SessionEvent::ThemeChanged(theme));
    }

    /// Wipe the local feed. Other peers keep theirs.
    pub fn clear_activity_feed(&mut self) {
        self.replica.activity.clear();
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════

    fn actor(&self) -> Actor {
        Actor {
            id: self.identity.peer_id.clone(),
            name: self.identity.name.clone(),
            color: self.identity.color.clone(),
            avatar: self.identity.avatar.clone(),
        }
    }

    fn record_activity(&mut self, kind: ActivityKind, details: ActivityDetails, broadcast: bool) {
        let event = ActivityEvent::new(kind, self.actor(), self.clock.now_ms(), details);
        self.insert_activity(event.clone());
        if broadcast {
            self.post(SessionMessage::ActivityEvent(event));
        }
    }

    fn insert_activity(&mut self, event: ActivityEvent) {
        if self.replica.activity.insert(event.clone()) {
            self.emit(SessionEvent::ActivityRecorded(event));
        }
    }

    /// Broadcast and track connection status. Failures never propagate.
    fn post(&mut self, message: SessionMessage) {
        let envelope = Envelope::new(self.identity.peer_id.clone(), message);
        match self.bus.post(&envelope) {
            Ok(()) => {
                if !self.status.is_connected() {
                    info!(peer = %self.identity.peer_id, "Bus reachable again");
                    self.set_status(ConnectionStatus::Connected);
                }
            }
            Err(e) => {
                warn!(
                    peer = %self.identity.peer_id,
                    msg_type = %envelope.message_type(),
                    error = %e,
                    "Broadcast failed, continuing locally"
                );
                if self.status.is_connected() {
                    self.set_status(ConnectionStatus::Disconnected(e.to_string()));
                }
            }
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status.clone();
        self.emit(SessionEvent::StatusChanged(status));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
