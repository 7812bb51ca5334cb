//! Multi-peer session tests
//!
//! Every test drives several engines over one in-process bus with virtual
//! time, so timeouts and debounces are exercised without sleeping.
//!
//! ## What These Tests Verify
//!
//! - Presence: join discovery, heartbeat timeout, explicit leave
//! - Reconciliation: a late joiner converges with every existing peer
//! - Counter: last-writer-wins across peers
//! - Chat: expiry, deletion, clearing
//! - Signals: debounced typing and cursor, immediate focus
//! - Transport loss degrades status without losing local state

mod common;

use std::sync::Arc;
use std::time::Duration;

use collabsync_core::{
    ActivityKind, ConnectionStatus, CursorPosition, FocusState, MessageType, RedbIdentityStore,
    SessionEvent, SessionMessage, Theme,
};
use common::{Observer, Sim};
use tempfile::TempDir;

fn texts(sim: &Sim, idx: usize) -> Vec<String> {
    sim.engine(idx)
        .view()
        .messages
        .into_iter()
        .map(|m| m.text)
        .collect()
}

// ============================================================================
// Presence
// ============================================================================

#[test]
fn test_join_is_discovered_both_ways() {
    let mut sim = Sim::new(1_000_000);
    let a = sim.join("Ada");
    let b = sim.join("Bob");

    let a_peers = sim.engine(a).view().peers;
    let b_peers = sim.engine(b).view().peers;
    assert_eq!(a_peers.len(), 1);
    assert_eq!(a_peers[0].name, "Bob");
    assert_eq!(b_peers.len(), 1);
    assert_eq!(b_peers[0].name, "Ada");
}

#[test]
fn test_silent_peer_times_out_within_one_sweep() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");

    // Bob's transport dies right after joining
    sim.peers[b].bus.set_online(false);

    sim.advance(Duration::from_millis(12_499));
    assert_eq!(sim.engine(a).view().peers.len(), 1);

    // Timeout is 12.5s and sweeps run every 5s
    sim.advance(Duration::from_millis(5_001));
    let view = sim.engine(a).view();
    assert!(view.peers.is_empty());
    assert_eq!(view.activity[0].kind, ActivityKind::UserLeft);
    assert_eq!(view.activity[0].actor.name, "Bob");
}

#[test]
fn test_heartbeats_keep_peers_alive() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    sim.join("Bob");
    sim.advance(Duration::from_secs(60));
    assert_eq!(sim.engine(a).view().peers.len(), 1);
}

#[test]
fn test_explicit_leave_removes_without_activity() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");
    let mut events = sim.engine(a).subscribe();

    sim.engine_mut(b).leave();
    sim.pump();

    let view = sim.engine(a).view();
    assert!(view.peers.is_empty());
    assert!(view.activity.iter().all(|e| e.kind != ActivityKind::UserLeft));

    let mut left = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::PeerLeft { peer_id, .. } = event {
            left = peer_id == sim.id(b);
        }
    }
    assert!(left);
}

#[test]
fn test_duplicate_join_payload_is_idempotent() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let observer = Observer::attach(&sim);

    let ghost = collabsync_core::Peer {
        id: "user_ghost".into(),
        name: "Ghost".into(),
        color: "#000000".into(),
        avatar: "👻".into(),
        joined_at: 0,
        last_seen: 0,
        is_typing: false,
        cursor: None,
        focus: None,
    };
    observer.post(SessionMessage::UserJoin(ghost.clone()));
    observer.post(SessionMessage::UserJoin(ghost));
    sim.pump();
    assert_eq!(sim.engine(a).view().peers.len(), 1);
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn test_late_joiner_converges_with_existing_peers() {
    let mut sim = Sim::new(10_000);
    let a = sim.join("Ada");
    sim.advance(Duration::from_millis(100));
    let b = sim.join("Bob");

    sim.engine_mut(a).send_message("first", None);
    sim.engine_mut(a)
        .send_message("vanishing", Some(Duration::from_millis(100)));
    sim.advance(Duration::from_millis(50));
    sim.engine_mut(b).send_message("second", None);
    sim.pump();
    sim.advance(Duration::from_millis(200));

    let c = sim.add_peer("Cy");
    let mut events = sim.engine(c).subscribe();
    sim.engine_mut(c).announce_join();
    sim.pump();

    let view = sim.engine(c).view();
    assert!(!view.is_initializing);
    let mut names: Vec<_> = view.peers.iter().map(|p| p.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["Ada", "Bob"]);
    // Two replies merged, no duplicates, expired message absent
    assert_eq!(texts(&sim, c), vec!["first", "second"]);

    let mut synced_from = 0;
    let mut finished = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Synced { .. } => synced_from += 1,
            SessionEvent::InitializationFinished { via_sync } => finished.push(via_sync),
            _ => {}
        }
    }
    assert_eq!(synced_from, 2);
    assert_eq!(finished, vec![true]);
}

#[test]
fn test_late_joiner_adopts_session_theme_and_counter() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    sim.engine_mut(a).set_theme(Theme::Dark);
    sim.engine_mut(a).set_counter(41);
    sim.engine_mut(a).increment_counter();

    let c = sim.join("Cy");
    assert_eq!(sim.engine(c).theme(), Theme::Dark);
    assert_eq!(sim.engine(c).counter().value, 42);
    // Activity came along with the sync
    assert!(sim
        .engine(c)
        .view()
        .activity
        .iter()
        .any(|e| e.kind == ActivityKind::ThemeChanged));
}

/// Ask every peer for a snapshot and return the message texts of the first reply
fn snapshot_texts(sim: &mut Sim, observer: &mut Observer) -> Vec<String> {
    observer.post(SessionMessage::StateRequest {
        requester: observer.id.clone(),
    });
    sim.pump();
    observer
        .drain()
        .into_iter()
        .find_map(|e| match e.message {
            SessionMessage::StateSync(snapshot) => Some(snapshot),
            _ => None,
        })
        .unwrap()
        .messages
        .into_iter()
        .map(|m| m.text)
        .collect()
}

#[test]
fn test_expired_message_never_in_snapshot() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    sim.engine_mut(a)
        .send_message("ephemeral", Some(Duration::from_millis(1_000)));
    sim.clock.set(1);
    sim.engine_mut(a).send_message("keeper", None);
    let mut observer = Observer::attach(&sim);

    sim.clock.set(999);
    assert_eq!(snapshot_texts(&mut sim, &mut observer), vec!["ephemeral", "keeper"]);
    sim.clock.set(1_000);
    assert_eq!(snapshot_texts(&mut sim, &mut observer), vec!["keeper"]);
}

#[test]
fn test_lonely_peer_initializes_by_timeout() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    assert!(sim.engine(a).is_initializing());
    sim.advance(Duration::from_millis(1_000));
    assert!(!sim.engine(a).is_initializing());
}

// ============================================================================
// Counter
// ============================================================================

#[test]
fn test_counter_newer_timestamp_wins() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");
    assert!(sim.engine(b).counter().last_action.is_none());

    sim.clock.set(100);
    sim.engine_mut(a).increment_counter();
    sim.pump();
    assert_eq!(sim.engine(b).counter().value, 1);
    assert_eq!(sim.engine(b).counter().stamp(), Some(100));

    sim.clock.set(150);
    sim.engine_mut(b).increment_counter();
    sim.pump();
    let held = sim.engine(a).counter().clone();
    assert_eq!(held.value, 2);
    assert_eq!(held.stamp(), Some(150));
    assert_eq!(held.last_action.unwrap().actor.name, "Bob");
}

#[test]
fn test_stale_counter_update_is_ignored() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let observer = Observer::attach(&sim);

    sim.clock.set(500);
    sim.engine_mut(a).set_counter(7);

    let mut stale = sim.engine(a).counter().clone();
    stale.value = -1;
    if let Some(action) = stale.last_action.as_mut() {
        action.timestamp = 400;
    }
    observer.post(SessionMessage::CounterUpdate(stale));
    sim.pump();
    assert_eq!(sim.engine(a).counter().value, 7);
}

#[test]
fn test_counter_set_across_full_range_renders_everywhere() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");

    sim.clock.set(100);
    sim.engine_mut(a).set_counter(-1);
    sim.clock.set(200);
    sim.engine_mut(a).set_counter(i64::MAX);
    sim.pump();

    assert_eq!(sim.engine(b).counter().value, i64::MAX);
    for idx in [a, b] {
        let lines: Vec<String> = sim
            .engine(idx)
            .view()
            .activity
            .iter()
            .map(|e| e.describe())
            .collect();
        assert_eq!(lines[0], "incremented counter (+9223372036854775808)");
    }
}

// ============================================================================
// Chat
// ============================================================================

#[test]
fn test_message_expires_everywhere_without_broadcast() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");
    let mut observer = Observer::attach(&sim);

    sim.engine_mut(a)
        .send_message("self-destruct", Some(Duration::from_millis(1_500)));
    sim.pump();
    assert_eq!(texts(&sim, b), vec!["self-destruct"]);
    observer.drain();

    sim.advance(Duration::from_millis(2_000));
    assert!(sim.engine(a).messages().is_empty());
    assert!(sim.engine(b).messages().is_empty());
    assert_eq!(observer.count(MessageType::ChatDelete), 0);
}

#[test]
fn test_delete_and_clear_propagate() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");

    let id = sim.engine_mut(a).send_message("oops", None).unwrap();
    sim.engine_mut(a).send_message("keep", None);
    sim.pump();
    assert!(sim.engine_mut(b).delete_message(&id));
    sim.pump();
    assert_eq!(texts(&sim, a), vec!["keep"]);

    sim.engine_mut(b).send_message("more", None);
    sim.pump();
    sim.engine_mut(a).clear_messages();
    sim.pump();
    assert!(texts(&sim, a).is_empty());
    assert!(texts(&sim, b).is_empty());
}

#[test]
fn test_message_activity_carries_preview() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");
    sim.clock.advance(Duration::from_millis(1));
    sim.engine_mut(a)
        .send_message("a fairly long message that goes past thirty characters", None);
    sim.pump();
    let line = sim.engine(b).view().activity[0].describe();
    assert_eq!(line, "sent: \"a fairly long message that goe...\"");
}

// ============================================================================
// Activity
// ============================================================================

#[test]
fn test_activity_feed_is_capped_newest_first() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");

    for _ in 0..60 {
        sim.clock.advance(Duration::from_millis(1));
        sim.engine_mut(a).increment_counter();
    }
    sim.pump();

    for idx in [a, b] {
        let feed = sim.engine(idx).view().activity;
        assert_eq!(feed.len(), 50);
        assert!(feed.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert_eq!(feed[0].describe(), "incremented counter (+1)");
    }

    let c = sim.join("Cy");
    assert_eq!(sim.engine(c).view().activity.len(), 50);
}

#[test]
fn test_activity_clear_is_local() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");
    sim.engine_mut(a).set_theme(Theme::Light);
    sim.pump();
    sim.engine_mut(a).clear_activity_feed();
    assert!(sim.engine(a).view().activity.is_empty());
    assert!(!sim.engine(b).view().activity.is_empty());
}

// ============================================================================
// Profile and Signals
// ============================================================================

#[test]
fn test_name_change_reaches_peers() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");
    sim.clock.advance(Duration::from_millis(1));
    sim.engine_mut(a).update_name("Ada L.").unwrap();
    sim.pump();

    let view = sim.engine(b).view();
    assert_eq!(view.peers[0].name, "Ada L.");
    assert_eq!(view.activity[0].describe(), "changed name to \"Ada L.\"");
}

#[test]
fn test_typing_is_debounced() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");
    let mut observer = Observer::attach(&sim);

    sim.engine_mut(a).mark_typing(true);
    sim.advance(Duration::from_millis(100));
    sim.engine_mut(a).mark_typing(false);
    sim.advance(Duration::from_millis(100));
    sim.engine_mut(a).mark_typing(true);
    sim.advance(Duration::from_millis(299));
    assert!(!sim.engine(b).view().peers[0].is_typing);

    sim.advance(Duration::from_millis(1));
    assert!(sim.engine(b).view().peers[0].is_typing);
    assert_eq!(observer.count(MessageType::UserTyping), 1);
}

#[test]
fn test_cursor_is_debounced_focus_is_immediate() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");
    let mut observer = Observer::attach(&sim);

    for x in 0..5 {
        sim.engine_mut(a)
            .update_cursor(Some(CursorPosition::new(x as f64, 10.0)));
        sim.advance(Duration::from_millis(10));
    }
    sim.engine_mut(a).update_focus(Some(FocusState {
        element_id: Some("chat-input".into()),
        element_type: Some("input".into()),
    }));
    sim.pump();
    let peer = sim.engine(b).view().peers[0].clone();
    assert_eq!(
        peer.focus.and_then(|f| f.element_id).as_deref(),
        Some("chat-input")
    );
    assert!(peer.cursor.is_none());

    sim.advance(Duration::from_millis(50));
    let peer = sim.engine(b).view().peers[0].clone();
    assert_eq!(peer.cursor.map(|c| c.x), Some(4.0));
    assert_eq!(observer.count(MessageType::UserCursor), 1);
}

// ============================================================================
// Transport and Identity
// ============================================================================

#[test]
fn test_transport_loss_keeps_local_state() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    let b = sim.join("Bob");

    sim.peers[a].bus.set_online(false);
    sim.engine_mut(a).send_message("into the void", None);
    sim.pump();
    assert_eq!(texts(&sim, a), vec!["into the void"]);
    assert!(texts(&sim, b).is_empty());
    assert!(matches!(
        sim.engine(a).status(),
        ConnectionStatus::Disconnected(_)
    ));

    sim.peers[a].bus.set_online(true);
    sim.advance(Duration::from_secs(5));
    assert!(sim.engine(a).status().is_connected());
}

#[test]
fn test_malformed_frames_are_harmless() {
    let mut sim = Sim::new(0);
    let a = sim.join("Ada");
    sim.join("Bob");
    sim.bus
        .inject_raw(&common::Sim::config("x").bus_channel(), vec![0xff; 16]);
    sim.pump();
    assert_eq!(sim.engine(a).view().peers.len(), 1);
}

#[test]
fn test_identity_survives_restart_until_reset() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("identity.redb");

    let first = {
        let mut sim = Sim::new(0);
        let store = Arc::new(RedbIdentityStore::open(&path).unwrap());
        let idx = sim.add_peer_with_store("Ada", store);
        assert!(sim.engine(idx).is_new_identity());
        sim.id(idx)
    };

    let second = {
        let mut sim = Sim::new(0);
        let store = Arc::new(RedbIdentityStore::open(&path).unwrap());
        let idx = sim.add_peer_with_store("Someone Else", store);
        assert!(!sim.engine(idx).is_new_identity());
        assert_eq!(sim.engine(idx).identity().name, "Ada");
        sim.engine_mut(idx).reset_identity().unwrap();
        sim.id(idx)
    };
    assert_eq!(first, second);

    let mut sim = Sim::new(0);
    let store = Arc::new(RedbIdentityStore::open(&path).unwrap());
    let idx = sim.add_peer_with_store("Ada", store);
    assert!(sim.engine(idx).is_new_identity());
    assert_ne!(sim.id(idx), first);
}
