//! In-process broadcast bus
//!
//! A [`LocalBus`] is a hub of named channels. Every peer that connects to a
//! channel gets a [`BusHandle`] for posting and a [`BusReceiver`] for
//! consuming. Delivery is fan-out with no acknowledgment; the receiver side
//! filters what the session engine should never see:
//!
//! - frames posted by the receiving peer itself
//! - message types the peer did not register
//! - frames that fail to decode
//! - envelope ids already seen within the deduplication TTL
//!
//! Frames are delivered in batches: after the first frame arrives the
//! receiver keeps collecting for the batching delay, unless the frame's type
//! is excluded from batching.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::protocol::{Envelope, MessageType, WireMessage};
use crate::clock::Clock;
use crate::config::BusConfig;
use crate::error::{SyncError, SyncResult};
use crate::types::{EnvelopeId, PeerId, Timestamp};

/// Fire-and-forget broadcast to every peer on a channel
pub trait BroadcastBus: Send + Sync {
    fn post(&self, envelope: &Envelope) -> SyncResult<()>;
}

#[derive(Debug, Clone)]
enum Frame {
    Data(Arc<Vec<u8>>),
    Ping {
        from: PeerId,
        reply: mpsc::UnboundedSender<PeerId>,
    },
}

#[derive(Debug)]
struct Subscriber {
    origin: PeerId,
    tx: mpsc::UnboundedSender<Frame>,
}

/// Hub of named broadcast channels
#[derive(Debug, Clone, Default)]
pub struct LocalBus {
    channels: Arc<Mutex<HashMap<String, Vec<Subscriber>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `channel` as `origin`.
    pub fn connect(
        &self,
        channel: impl Into<String>,
        origin: PeerId,
        registered: &[MessageType],
        config: BusConfig,
        clock: Arc<dyn Clock>,
    ) -> (BusHandle, BusReceiver) {
        let channel = channel.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels
            .lock()
            .entry(channel.clone())
            .or_default()
            .push(Subscriber {
                origin: origin.clone(),
                tx,
            });
        debug!(channel = %channel, peer = %origin, "Connected to bus channel");

        let online = Arc::new(AtomicBool::new(true));
        let handle = BusHandle {
            bus: self.clone(),
            channel,
            origin: origin.clone(),
            online: online.clone(),
        };
        let receiver = BusReceiver {
            origin,
            rx,
            registered: registered.iter().copied().collect(),
            excluded: config.batching_excluded.iter().copied().collect(),
            batching_delay: config.batching_delay(),
            dedup_ttl_ms: config.dedup_ttl_ms as i64,
            cleaning_interval_ms: config.cleaning_interval_ms as i64,
            seen: HashMap::new(),
            last_clean: clock.now_ms(),
            clock,
            online,
            pending: Vec::new(),
            batch_deadline: None,
        };
        (handle, receiver)
    }

    /// Number of live subscribers on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let mut channels = self.channels.lock();
        match channels.get_mut(channel) {
            Some(subs) => {
                subs.retain(|s| !s.tx.is_closed());
                subs.len()
            }
            None => 0,
        }
    }

    /// Push raw bytes to every subscriber on `channel`, bypassing encoding.
    ///
    /// Lets callers exercise the receive-side filters with arbitrary frames.
    pub fn inject_raw(&self, channel: &str, bytes: Vec<u8>) -> usize {
        self.fan_out(channel, None, Frame::Data(Arc::new(bytes)))
    }

    /// Send a frame to every subscriber except `skip`. Drops closed subscribers.
    fn fan_out(&self, channel: &str, skip: Option<&PeerId>, frame: Frame) -> usize {
        let mut channels = self.channels.lock();
        let Some(subs) = channels.get_mut(channel) else {
            return 0;
        };
        let mut delivered = 0;
        subs.retain(|sub| {
            if skip == Some(&sub.origin) {
                return !sub.tx.is_closed();
            }
            match sub.tx.send(frame.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }
}

/// Sending side of one peer's bus connection
#[derive(Debug, Clone)]
pub struct BusHandle {
    bus: LocalBus,
    channel: String,
    origin: PeerId,
    online: Arc<AtomicBool>,
}

impl BusHandle {
    pub fn origin(&self) -> &PeerId {
        &self.origin
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Simulate losing or regaining the transport. While offline, posts fail
    /// and inbound frames are dropped.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Probe which peers are reachable.
    ///
    /// Returns whoever answered before `timeout` elapsed. Never waits longer.
    pub async fn ping(&self, timeout: Duration) -> Vec<PeerId> {
        if !self.is_online() {
            return Vec::new();
        }
        let (reply, mut replies) = mpsc::unbounded_channel();
        let probed = self.bus.fan_out(
            &self.channel,
            Some(&self.origin),
            Frame::Ping {
                from: self.origin.clone(),
                reply,
            },
        );

        let mut seen = HashSet::new();
        let mut answered = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        while answered.len() < probed {
            match tokio::time::timeout_at(deadline, replies.recv()).await {
                Ok(Some(peer)) => {
                    if seen.insert(peer.clone()) {
                        answered.push(peer);
                    }
                }
                // Every probed receiver dropped its reply sender, or time ran out
                Ok(None) | Err(_) => break,
            }
        }
        debug!(probed, answered = answered.len(), "Ping finished");
        answered
    }
}

impl BroadcastBus for BusHandle {
    fn post(&self, envelope: &Envelope) -> SyncResult<()> {
        if !self.is_online() {
            return Err(SyncError::Transport(format!(
                "bus channel {} is unreachable",
                self.channel
            )));
        }
        let bytes = WireMessage::new(envelope.clone()).encode()?;
        let delivered = self
            .bus
            .fan_out(&self.channel, Some(&self.origin), Frame::Data(Arc::new(bytes)));
        trace!(msg_type = %envelope.message_type(), delivered, "Posted to bus");
        Ok(())
    }
}

/// Receiving side of one peer's bus connection
pub struct BusReceiver {
    origin: PeerId,
    rx: mpsc::UnboundedReceiver<Frame>,
    registered: HashSet<MessageType>,
    excluded: HashSet<MessageType>,
    batching_delay: Duration,
    dedup_ttl_ms: i64,
    cleaning_interval_ms: i64,
    seen: HashMap<EnvelopeId, Timestamp>,
    last_clean: Timestamp,
    clock: Arc<dyn Clock>,
    online: Arc<AtomicBool>,
    pending: Vec<Envelope>,
    batch_deadline: Option<tokio::time::Instant>,
}

impl std::fmt::Debug for BusReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusReceiver")
            .field("origin", &self.origin)
            .field("registered", &self.registered.len())
            .field("seen", &self.seen.len())
            .finish()
    }
}

impl BusReceiver {
    /// Wait for the next batch.
    ///
    /// Returns `None` once the bus is gone and nothing is pending. A batch is
    /// never empty. Cancel safe: a partly collected batch stays on the
    /// receiver and is returned by the next call.
    pub async fn recv_batch(&mut self) -> Option<Vec<Envelope>> {
        loop {
            let frame = match self.batch_deadline {
                None => self.rx.recv().await,
                Some(deadline) => match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                    Ok(frame) => frame,
                    Err(_) => return Some(self.flush()),
                },
            };
            let Some(frame) = frame else {
                return (!self.pending.is_empty()).then(|| self.flush());
            };
            if let Some(envelope) = self.accept(frame) {
                let flush_now = self.excluded.contains(&envelope.message_type());
                self.pending.push(envelope);
                if flush_now {
                    return Some(self.flush());
                }
                if self.batch_deadline.is_none() {
                    self.batch_deadline = Some(tokio::time::Instant::now() + self.batching_delay);
                }
            }
        }
    }

    /// Drain whatever is already queued, without waiting
    pub fn try_recv_batch(&mut self) -> Vec<Envelope> {
        let mut batch = self.flush();
        while let Ok(frame) = self.rx.try_recv() {
            if let Some(envelope) = self.accept(frame) {
                batch.push(envelope);
            }
        }
        batch
    }

    fn flush(&mut self) -> Vec<Envelope> {
        self.batch_deadline = None;
        std::mem::take(&mut self.pending)
    }

    fn accept(&mut self, frame: Frame) -> Option<Envelope> {
        let online = self.online.load(Ordering::SeqCst);
        let bytes = match frame {
            Frame::Ping { from, reply } => {
                if online && from != self.origin {
                    let _ = reply.send(self.origin.clone());
                }
                return None;
            }
            Frame::Data(bytes) => bytes,
        };
        if !online {
            return None;
        }

        let envelope = match WireMessage::decode(&bytes) {
            Ok(wire) => wire.into_inner(),
            Err(e) => {
                warn!(peer = %self.origin, error = %e, len = bytes.len(), "Dropping malformed frame");
                return None;
            }
        };

        if envelope.origin == self.origin {
            return None;
        }
        let msg_type = envelope.message_type();
        if !self.registered.contains(&msg_type) {
            debug!(msg_type = %msg_type, "Dropping unregistered message type");
            return None;
        }

        let now = self.clock.now_ms();
        if now - self.last_clean >= self.cleaning_interval_ms {
            let ttl = self.dedup_ttl_ms;
            self.seen.retain(|_, at| now - *at < ttl);
            self.last_clean = now;
        }
        if let Some(at) = self.seen.get(&envelope.id) {
            if now - *at < self.dedup_ttl_ms {
                trace!(envelope = %envelope.id, "Dropping duplicate envelope");
                return None;
            }
        }
        self.seen.insert(envelope.id.clone(), now);
        Some(envelope)
    }
}
