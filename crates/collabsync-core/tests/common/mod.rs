//! Deterministic multi-peer harness
//!
//! Several engines share one `LocalBus` and one `ManualClock`. Nothing runs on
//! its own: `pump` delivers queued frames until the bus is quiet, and
//! `advance` walks virtual time from one timer deadline to the next.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use collabsync_core::{
    BusHandle, BusReceiver, Clock, Envelope, Identity, IdentityStore, LocalBus, ManualClock,
    MemoryIdentityStore, MessageType, PeerId, SessionConfig, SessionEngine, SessionMessage,
    Timestamp,
};

pub const CHANNEL: &str = "sim";

pub struct SimPeer {
    pub engine: SessionEngine,
    pub bus: BusHandle,
    pub receiver: BusReceiver,
}

pub struct Sim {
    pub clock: ManualClock,
    pub bus: LocalBus,
    pub peers: Vec<SimPeer>,
}

impl Sim {
    pub fn new(start: Timestamp) -> Self {
        Self {
            clock: ManualClock::new(start),
            bus: LocalBus::new(),
            peers: Vec::new(),
        }
    }

    pub fn config(name: &str) -> SessionConfig {
        let mut config = SessionConfig::for_channel(CHANNEL);
        config.user_name = Some(name.to_string());
        config
    }

    /// Add a peer with a fresh in-memory identity. Not joined yet.
    pub fn add_peer(&mut self, name: &str) -> usize {
        self.add_peer_with_store(name, Arc::new(MemoryIdentityStore::new()))
    }

    pub fn add_peer_with_store(&mut self, name: &str, store: Arc<dyn IdentityStore>) -> usize {
        let config = Self::config(name);
        let (identity, is_new) =
            Identity::load_or_create(store.as_ref(), &config.channel_name, Some(name), None)
                .unwrap();
        let clock: Arc<dyn Clock> = Arc::new(self.clock.clone());
        let (bus, receiver) = self.bus.connect(
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
            Arc::new(bus.clone()),
            clock,
        )
        .unwrap();
        self.peers.push(SimPeer {
            engine,
            bus,
            receiver,
        });
        self.peers.len() - 1
    }

    /// Add a peer, announce it and let the session settle
    pub fn join(&mut self, name: &str) -> usize {
        let idx = self.add_peer(name);
        self.peers[idx].engine.announce_join();
        self.pump();
        idx
    }

    pub fn engine(&self, idx: usize) -> &SessionEngine {
        &self.peers[idx].engine
    }

    pub fn engine_mut(&mut self, idx: usize) -> &mut SessionEngine {
        &mut self.peers[idx].engine
    }

    pub fn id(&self, idx: usize) -> PeerId {
        self.peers[idx].engine.peer_id().clone()
    }

    /// Deliver queued frames until no peer has anything left to read
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..100 {
            let mut moved = 0;
            for peer in &mut self.peers {
                let batch = peer.receiver.try_recv_batch();
                moved += batch.len();
                peer.engine.handle_batch(batch);
            }
            if moved == 0 {
                break;
            }
            delivered += moved;
        }
        delivered
    }

    /// Advance virtual time, firing every timer on the way in due order
    pub fn advance(&mut self, by: Duration) {
        let target = self.clock.now_ms() + by.as_millis() as i64;
        loop {
            let next = self
                .peers
                .iter_mut()
                .filter_map(|p| p.engine.next_deadline())
                .min();
            match next {
                Some(at) if at <= target => {
                    if at > self.clock.now_ms() {
                        self.clock.set(at);
                    }
                    for peer in &mut self.peers {
                        peer.engine.run_due_timers();
                    }
                    self.pump();
                }
                _ => break,
            }
        }
        self.clock.set(target);
        self.pump();
    }
}

/// A bare bus listener used to inspect traffic
pub struct Observer {
    pub id: PeerId,
    pub bus: BusHandle,
    pub receiver: BusReceiver,
}

impl Observer {
    pub fn attach(sim: &Sim) -> Self {
        let id = PeerId::from("user_observer");
        let config = SessionConfig::for_channel(CHANNEL);
        let (bus, receiver) = sim.bus.connect(
            config.bus_channel(),
            id.clone(),
            &MessageType::ALL,
            config.bus.clone(),
            Arc::new(sim.clock.clone()),
        );
        Self { id, bus, receiver }
    }

    pub fn post(&self, message: SessionMessage) {
        use collabsync_core::BroadcastBus;
        self.bus
            .post(&Envelope::new(self.id.clone(), message))
            .unwrap();
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        self.receiver.try_recv_batch()
    }

    pub fn count(&mut self, msg_type: MessageType) -> usize {
        self.drain()
            .iter()
            .filter(|e| e.message_type() == msg_type)
            .count()
    }
}
