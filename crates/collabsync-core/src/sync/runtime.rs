//! Async driver for a [`SessionEngine`]
//!
//! One tokio task owns the engine and selects over three sources:
//! inbound bus batches, commands from [`SessionHandle`]s, and the engine's
//! next timer deadline. Everything the engine does therefore happens on one
//! task, in order, without locks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::bus::{BusHandle, BusReceiver};
use super::events::SessionEvent;
use crate::counter::{CounterAction, CounterState};
use crate::engine::{SessionEngine, SessionView};
use crate::error::{SyncError, SyncResult};
use crate::types::{CursorPosition, FocusState, MessageId, PeerId, Theme};

/// Sleep used when no timer is armed
const IDLE_WAIT: Duration = Duration::from_secs(3600);

enum Command {
    SendMessage {
        text: String,
        expires_in: Option<Duration>,
        reply: oneshot::Sender<Option<MessageId>>,
    },
    DeleteMessage {
        message_id: MessageId,
        reply: oneshot::Sender<bool>,
    },
    ClearMessages,
    Counter {
        action: CounterAction,
        set_to: Option<i64>,
        reply: oneshot::Sender<CounterState>,
    },
    SetTheme(Theme),
    UpdateName {
        name: String,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    UpdateAvatar {
        avatar: String,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    MarkTyping(bool),
    UpdateCursor(Option<CursorPosition>),
    UpdateFocus(Option<FocusState>),
    ClearActivity,
    VisibilityRegained,
    ResetIdentity {
        reply: oneshot::Sender<SyncResult<()>>,
    },
    View {
        reply: oneshot::Sender<SessionView>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Spawns the control loop for one engine
pub struct SessionRuntime;

impl SessionRuntime {
    /// Announce `engine` on the bus and drive it until shutdown.
    ///
    /// `bus` must be the handle the engine posts through; it is kept for
    /// liveness probes and transport simulation.
    pub fn spawn(engine: SessionEngine, bus: BusHandle, receiver: BusReceiver) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            peer_id: engine.peer_id().clone(),
            ping_timeout: engine.config().ping_timeout(),
            events: engine.event_sender(),
            commands: command_tx,
            bus,
            task: Arc::new(parking_lot::Mutex::new(None)),
        };
        let task = tokio::spawn(run(engine, receiver, command_rx));
        *handle.task.lock() = Some(task);
        handle
    }
}

async fn run(
    mut engine: SessionEngine,
    mut receiver: BusReceiver,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let peer = engine.peer_id().clone();
    engine.announce_join();
    debug!(peer = %peer, "Session loop started");

    loop {
        let wait = match engine.next_deadline() {
            Some(at) => Duration::from_millis((at - engine.now_ms()).max(0) as u64),
            None => IDLE_WAIT,
        };

        tokio::select! {
            batch = receiver.recv_batch() => match batch {
                Some(batch) => engine.handle_batch(batch),
                None => {
                    info!(peer = %peer, "Bus closed, stopping session");
                    engine.leave();
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Shutdown { reply }) => {
                    engine.leave();
                    let _ = reply.send(());
                    break;
                }
                Some(command) => apply(&mut engine, command),
                None => {
                    // Every handle dropped
                    engine.leave();
                    break;
                }
            },
            _ = tokio::time::sleep(wait) => {}
        }

        engine.run_due_timers();
    }

    debug!(peer = %peer, "Session loop ended");
}

fn apply(engine: &mut SessionEngine, command: Command) {
    match command {
        Command::SendMessage {
            text,
            expires_in,
            reply,
        } => {
            let _ = reply.send(engine.send_message(&text, expires_in));
        }
        Command::DeleteMessage { message_id, reply } => {
            let _ = reply.send(engine.delete_message(&message_id));
        }
        Command::ClearMessages => engine.clear_messages(),
        Command::Counter {
            action,
            set_to,
            reply,
        } => {
            let state = match (action, set_to) {
                (CounterAction::Increment, _) => engine.increment_counter(),
                (CounterAction::Decrement, _) => engine.decrement_counter(),
                (CounterAction::Reset, _) => engine.reset_counter(),
                (CounterAction::Set, value) => engine.set_counter(value.unwrap_or_default()),
            };
            let _ = reply.send(state);
        }
        Command::SetTheme(theme) => engine.set_theme(theme),
        Command::UpdateName { name, reply } => {
            let _ = reply.send(engine.update_name(&name));
        }
        Command::UpdateAvatar { avatar, reply } => {
            let _ = reply.send(engine.update_avatar(&avatar));
        }
        Command::MarkTyping(is_typing) => engine.mark_typing(is_typing),
        Command::UpdateCursor(cursor) => engine.update_cursor(cursor),
        Command::UpdateFocus(focus) => engine.update_focus(focus),
        Command::ClearActivity => engine.clear_activity_feed(),
        Command::VisibilityRegained => engine.on_visibility_regained(),
        Command::ResetIdentity { reply } => {
            let _ = reply.send(engine.reset_identity());
        }
        Command::View { reply } => {
            let _ = reply.send(engine.view());
        }
        // Handled by the loop
        Command::Shutdown { .. } => {}
    }
}

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    peer_id: PeerId,
    ping_timeout: Duration,
    events: broadcast::Sender<SessionEvent>,
    commands: mpsc::UnboundedSender<Command>,
    bus: BusHandle,
    task: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("peer_id", &self.peer_id)
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl SessionHandle {
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The bus connection, for transport simulation
    pub fn bus(&self) -> &BusHandle {
        &self.bus
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) -> SyncResult<()> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::SessionClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> SyncResult<T> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply))?;
        response.await.map_err(|_| SyncError::SessionClosed)
    }

    pub async fn view(&self) -> SyncResult<SessionView> {
        self.request(|reply| Command::View { reply }).await
    }

    pub async fn send_message(
        &self,
        text: impl Into<String>,
        expires_in: Option<Duration>,
    ) -> SyncResult<Option<MessageId>> {
        let text = text.into();
        self.request(|reply| Command::SendMessage {
            text,
            expires_in,
            reply,
        })
        .await
    }

    pub async fn delete_message(&self, message_id: MessageId) -> SyncResult<bool> {
        self.request(|reply| Command::DeleteMessage { message_id, reply })
            .await
    }

    pub fn clear_messages(&self) -> SyncResult<()> {
        self.send(Command::ClearMessages)
    }

    async fn counter(&self, action: CounterAction, set_to: Option<i64>) -> SyncResult<CounterState> {
        self.request(|reply| Command::Counter {
            action,
            set_to,
            reply,
        })
        .await
    }

    pub async fn increment_counter(&self) -> SyncResult<CounterState> {
        self.counter(CounterAction::Increment, None).await
    }

    pub async fn decrement_counter(&self) -> SyncResult<CounterState> {
        self.counter(CounterAction::Decrement, None).await
    }

    pub async fn reset_counter(&self) -> SyncResult<CounterState> {
        self.counter(CounterAction::Reset, None).await
    }

    pub async fn set_counter(&self, value: i64) -> SyncResult<CounterState> {
        self.counter(CounterAction::Set, Some(value)).await
    }

    pub fn set_theme(&self, theme: Theme) -> SyncResult<()> {
        self.send(Command::SetTheme(theme))
    }

    pub async fn update_name(&self, name: impl Into<String>) -> SyncResult<()> {
        let name = name.into();
        self.request(|reply| Command::UpdateName { name, reply })
            .await?
    }

    pub async fn update_avatar(&self, avatar: impl Into<String>) -> SyncResult<()> {
        let avatar = avatar.into();
        self.request(|reply| Command::UpdateAvatar { avatar, reply })
            .await?
    }

    pub fn mark_typing(&self, is_typing: bool) -> SyncResult<()> {
        self.send(Command::MarkTyping(is_typing))
    }

    pub fn update_cursor(&self, cursor: Option<CursorPosition>) -> SyncResult<()> {
        self.send(Command::UpdateCursor(cursor))
    }

    pub fn update_focus(&self, focus: Option<FocusState>) -> SyncResult<()> {
        self.send(Command::UpdateFocus(focus))
    }

    pub fn clear_activity_feed(&self) -> SyncResult<()> {
        self.send(Command::ClearActivity)
    }

    pub fn visibility_regained(&self) -> SyncResult<()> {
        self.send(Command::VisibilityRegained)
    }

    pub async fn reset_identity(&self) -> SyncResult<()> {
        self.request(|reply| Command::ResetIdentity { reply })
            .await?
    }

    /// Peers that answered a liveness probe within the ping timeout
    pub async fn ping(&self) -> Vec<PeerId> {
        self.bus.ping(self.ping_timeout).await
    }

    /// Post a leave notice and stop the loop. Idempotent.
    pub async fn shutdown(&self) {
        if self.request(|reply| Command::Shutdown { reply }).await.is_err() {
            debug!(peer = %self.peer_id, "Session already closed");
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, TokioClock};
    use crate::config::SessionConfig;
    use crate::identity::MemoryIdentityStore;
    use crate::sync::bus::LocalBus;
    use crate::sync::protocol::MessageType;

    fn start(bus: &LocalBus, clock: &Arc<dyn Clock>) -> SessionHandle {
        let config = SessionConfig::for_channel("runtime-test");
        let store = Arc::new(MemoryIdentityStore::new());
        let (identity, is_new) = crate::identity::Identity::load_or_create(
            store.as_ref(),
            &config.channel_name,
            None,
            None,
        )
        .unwrap();
        let (handle, receiver) = bus.connect(
            config.bus_channel(),
            identity.peer_id.clone(),
            &MessageType::ALL,
            config.bus.clone(),
            clock.clone(),
        );
        let engine = SessionEngine::from_identity(
            config,
            identity,
            is_new,
            store,
            Arc::new(handle.clone()),
            clock.clone(),
        )
        .unwrap();
        SessionRuntime::spawn(engine, handle, receiver)
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_runtimes_converge() {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let bus = LocalBus::new();
        let a = start(&bus, &clock);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let b = start(&bus, &clock);
        tokio::time::sleep(Duration::from_millis(100)).await;

        a.send_message("hello", None).await.unwrap();
        b.increment_counter().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let view_a = a.view().await.unwrap();
        let view_b = b.view().await.unwrap();
        assert_eq!(view_a.peers.len(), 1);
        assert_eq!(view_b.peers.len(), 1);
        assert_eq!(view_b.messages.len(), 1);
        assert_eq!(view_a.counter.value, 1);
        assert!(!view_b.is_initializing);

        let mut answered = a.ping().await;
        answered.sort();
        assert_eq!(answered, vec![b.peer_id().clone()]);

        b.shutdown().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(a.view().await.unwrap().peers.is_empty());
        assert!(matches!(b.view().await, Err(SyncError::SessionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_regained_heartbeats_immediately() {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let bus = LocalBus::new();
        let a = start(&bus, &clock);
        let b = start(&bus, &clock);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut events = b.subscribe();
        a.visibility_regained().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut refreshed = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::PeerUpdated { peer_id } = event {
                refreshed |= &peer_id == a.peer_id();
            }
        }
        // Well before the first periodic heartbeat at 5s
        assert!(refreshed);
        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lonely_peer_finishes_initialization_by_timeout() {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let bus = LocalBus::new();
        let a = start(&bus, &clock);
        let mut events = a.subscribe();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(!a.view().await.unwrap().is_initializing);

        let mut finished = None;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::InitializationFinished { via_sync } = event {
                finished = Some(via_sync);
            }
        }
        assert_eq!(finished, Some(false));
        a.shutdown().await;
    }
}
