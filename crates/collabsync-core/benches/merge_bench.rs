//! Benchmarks for join-time reconciliation
//!
//! Run with: cargo bench -p collabsync-core
//!
//! Baselines for:
//! - Building a snapshot from a busy replica
//! - Merging one snapshot into an empty replica
//! - Re-merging a snapshot that is already known (the N-replies case)
//! - Wire encode/decode of a full snapshot

use std::hint::black_box;

use collabsync_core::{
    ActivityDetails, ActivityEvent, ActivityKind, Actor, ChatMessage, CounterAction, Envelope,
    Peer, PeerId, Reconciler, Replica, SessionMessage, StateSnapshot, Theme, Timer, WireMessage,
};
use collabsync_core::scheduler::Scheduler;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn actor(n: usize) -> Actor {
    Actor {
        id: PeerId::from(format!("user_{n}")),
        name: format!("User {n}"),
        color: "#8b5cf6".into(),
        avatar: "🐨".into(),
    }
}

fn peer(n: usize) -> Peer {
    let actor = actor(n);
    Peer {
        id: actor.id,
        name: actor.name,
        color: actor.color,
        avatar: actor.avatar,
        joined_at: n as i64,
        last_seen: 1_000,
        is_typing: false,
        cursor: None,
        focus: None,
    }
}

/// A replica holding `size` peers, messages and activity events
fn busy_replica(size: usize) -> Replica {
    let mut replica = Replica::new(PeerId::from("user_0"), Theme::Dark, 50);
    for n in 1..=size {
        replica.presence.on_heartbeat(peer(n), 1_000);
        if let Some(message) =
            ChatMessage::compose(actor(n), &format!("message number {n}"), n as i64, None)
        {
            replica.messages.insert(message, 1_000);
        }
        replica.activity.insert(ActivityEvent::new(
            ActivityKind::MessageSent,
            actor(n),
            n as i64,
            ActivityDetails::MessagePreview {
                preview: format!("message number {n}"),
            },
        ));
    }
    replica
        .counter
        .apply_local(CounterAction::Set, Some(size as i64), actor(1), 900);
    replica
}

fn snapshot(size: usize) -> StateSnapshot {
    busy_replica(size).snapshot(peer(0), PeerId::from("user_joiner"), 1_000)
}

// ============================================================================
// Snapshot Benchmarks
// ============================================================================

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    for size in [10, 100, 500] {
        let replica = busy_replica(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &replica, |b, replica| {
            b.iter(|| {
                black_box(replica.snapshot(peer(0), PeerId::from("user_joiner"), 1_000))
            })
        });
    }
    group.finish();
}

// ============================================================================
// Merge Benchmarks
// ============================================================================

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for size in [10, 100, 500] {
        let snap = snapshot(size);

        group.bench_with_input(BenchmarkId::new("into_empty", size), &snap, |b, snap| {
            b.iter_batched(
                || {
                    (
                        Replica::new(PeerId::from("user_joiner"), Theme::System, 50),
                        Reconciler::new(PeerId::from("user_joiner")),
                        Scheduler::<Timer>::new(),
                    )
                },
                |(mut replica, mut reconciler, mut scheduler)| {
                    black_box(reconciler.merge(snap.clone(), &mut replica, &mut scheduler, 1_000))
                },
                criterion::BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("already_known", size), &snap, |b, snap| {
            b.iter_batched(
                || {
                    let mut replica = Replica::new(PeerId::from("user_joiner"), Theme::System, 50);
                    let mut reconciler = Reconciler::new(PeerId::from("user_joiner"));
                    let mut scheduler = Scheduler::<Timer>::new();
                    reconciler.merge(snap.clone(), &mut replica, &mut scheduler, 1_000);
                    (replica, reconciler, scheduler)
                },
                |(mut replica, mut reconciler, mut scheduler)| {
                    black_box(reconciler.merge(snap.clone(), &mut replica, &mut scheduler, 1_000))
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

// ============================================================================
// Wire Benchmarks
// ============================================================================

fn bench_wire(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire");
    let wire = WireMessage::new(Envelope::new(
        PeerId::from("user_0"),
        SessionMessage::StateSync(snapshot(100)),
    ));
    let bytes = wire.encode().unwrap();

    group.bench_function("encode_snapshot_100", |b| {
        b.iter(|| black_box(wire.encode().unwrap()))
    });
    group.bench_function("decode_snapshot_100", |b| {
        b.iter(|| black_box(WireMessage::decode(&bytes).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_snapshot, bench_merge, bench_wire);
criterion_main!(benches);
