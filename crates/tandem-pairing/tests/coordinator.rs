//! Integration tests for the coordinator actor.
//!
//! Time-dependent tests run with `start_paused = true`: when every task is
//! idle, Tokio jumps the clock to the next timer, so `sleep(25s)` in the
//! test lets the coordinator's 10 s sweeps fire at 10 s and 20 s first.
//! Sleep targets are kept off multiples of the sweep interval so the order
//! of test and sweep is never ambiguous.

use std::time::Duration;

use tandem_pairing::{
    CallerId, CloseReason, CoordinatorHandle, EvictionReason, JoinOutcome,
    PairingConfig, PairingError, PairingEvent, RoomId, spawn_coordinator,
};
use tokio::sync::broadcast;
use tokio::time::sleep;

// =========================================================================
// Helpers
// =========================================================================

fn cid(raw: &str) -> CallerId {
    CallerId::new(raw).expect("valid caller id")
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn coordinator() -> CoordinatorHandle {
    spawn_coordinator(PairingConfig::default())
}

/// Heartbeats `caller` every 5 s for `total`.
async fn keep_alive(handle: &CoordinatorHandle, caller: &CallerId, total: Duration) {
    let step = secs(5);
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        sleep(step).await;
        elapsed += step;
        handle.heartbeat(caller.clone()).await.unwrap();
    }
}

/// Drains every event currently buffered on `rx`.
fn drain(rx: &mut broadcast::Receiver<PairingEvent>) -> Vec<PairingEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =========================================================================
// Pairing
// =========================================================================

#[tokio::test]
async fn test_pairing_is_symmetric() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();
    handle.join(cid("b")).await.unwrap();

    let ra = handle.get_match(cid("a")).await.unwrap().unwrap();
    let rb = handle.get_match(cid("b")).await.unwrap().unwrap();

    assert_eq!(ra.room_id(), rb.room_id());
    assert_eq!(ra.partner_of(&cid("a")), Some(&cid("b")));
    assert_eq!(rb.partner_of(&cid("b")), Some(&cid("a")));
    handle.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_fifo_pairs_first_two_and_queues_third() {
    let handle = coordinator();

    let a = handle.join(cid("a")).await.unwrap();
    let b = handle.join(cid("b")).await.unwrap();
    let c = handle.join(cid("c")).await.unwrap();

    assert_eq!(a, JoinOutcome::Queued { position: 1 });
    let room = b.room().expect("b completes the pair");
    assert_eq!(room.participants(), &[cid("a"), cid("b")]);
    assert_eq!(c, JoinOutcome::Queued { position: 1 });
    assert!(handle.is_queued(cid("c")).await.unwrap());

    let d = handle.join(cid("d")).await.unwrap();
    assert_eq!(d.room().unwrap().participants(), &[cid("c"), cid("d")]);
    assert_eq!(handle.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_join_twice_when_matched_returns_identical_room() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();
    let room = handle.join(cid("b")).await.unwrap().into_room().unwrap();

    let first = handle.join(cid("a")).await.unwrap();
    let second = handle.join(cid("a")).await.unwrap();

    assert_eq!(first, JoinOutcome::Rejoined(room.clone()));
    assert_eq!(second, JoinOutcome::Rejoined(room));
    assert_eq!(handle.stats().await.unwrap().rooms, 1);
}

#[tokio::test]
async fn test_leave_tears_down_room_for_partner() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();
    handle.join(cid("b")).await.unwrap();

    let closed = handle.leave(cid("a")).await.unwrap();

    assert!(closed.is_some());
    assert!(handle.get_match(cid("b")).await.unwrap().is_none());
    assert!(!handle.is_queued(cid("b")).await.unwrap());
    handle.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_unknown_callers_are_noops() {
    let handle = coordinator();

    assert!(handle.leave(cid("ghost")).await.unwrap().is_none());
    assert!(handle.end_match(cid("ghost")).await.unwrap().is_none());
    assert!(handle.get_match(cid("ghost")).await.unwrap().is_none());
    handle.heartbeat(cid("ghost")).await.unwrap();

    assert_eq!(handle.stats().await.unwrap().tracked, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_never_double_pair() {
    let handle = coordinator();

    let mut tasks = Vec::new();
    for i in 0..200 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle.join(cid(&format!("caller-{i}"))).await.unwrap()
        }));
    }
    let mut matched = 0;
    for task in tasks {
        if matches!(task.await.unwrap(), JoinOutcome::Matched(_)) {
            matched += 1;
        }
    }

    let stats = handle.stats().await.unwrap();
    assert_eq!(matched, 100);
    assert_eq!(stats.rooms, 100);
    assert_eq!(stats.queued, 0);
    handle.check_invariants().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_join_and_leave_keep_invariants() {
    let handle = coordinator();

    let mut tasks = Vec::new();
    for i in 0..100 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let me = cid(&format!("caller-{i}"));
            handle.join(me.clone()).await.unwrap();
            if i % 3 == 0 {
                handle.leave(me.clone()).await.unwrap();
            }
            if i % 5 == 0 {
                handle.end_match(me).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    handle.check_invariants().await.unwrap();
}

// =========================================================================
// Events
// =========================================================================

#[tokio::test]
async fn test_events_for_match_and_leave() {
    let handle = coordinator();
    let mut rx = handle.subscribe();

    handle.join(cid("a")).await.unwrap();
    let room = handle.join(cid("b")).await.unwrap().into_room().unwrap();
    handle.leave(cid("b")).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            PairingEvent::Matched {
                room: room.clone(),
                joined_by: cid("b"),
            },
            PairingEvent::RoomClosed {
                room,
                closed_by: cid("b"),
                reason: CloseReason::Left,
            },
        ]
    );
    assert!(events[0].notifies(&cid("a")));
    assert!(events[1].notifies(&cid("a")));
}

#[tokio::test]
async fn test_end_match_emits_room_closed_ended() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();
    handle.join(cid("b")).await.unwrap();
    let mut rx = handle.subscribe();

    handle.end_match(cid("a")).await.unwrap();

    let events = drain(&mut rx);
    assert!(matches!(
        events.as_slice(),
        [PairingEvent::RoomClosed {
            reason: CloseReason::Ended,
            ..
        }]
    ));
}

// =========================================================================
// Reclaimer
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_silent_queued_caller_evicted_within_timeout_plus_tick() {
    let handle = coordinator();
    let mut rx = handle.subscribe();
    handle.join(cid("a")).await.unwrap();

    // heartbeat_timeout (15) + sweep_interval (10)
    sleep(secs(25)).await;

    assert!(!handle.is_queued(cid("a")).await.unwrap());
    assert_eq!(handle.queue_depth().await.unwrap(), 0);
    assert_eq!(
        drain(&mut rx),
        vec![PairingEvent::Evicted {
            caller: cid("a"),
            reason: EvictionReason::HeartbeatExpired,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_silent_caller_survives_first_sweep() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();

    // Sweep at 10 s sees a 10 s old heartbeat: not stale yet.
    sleep(secs(12)).await;

    assert!(handle.is_queued(cid("a")).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeating_pair_is_never_reclaimed() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();
    let room = handle.join(cid("b")).await.unwrap().into_room().unwrap();

    let a = cid("a");
    let b = cid("b");
    let keep_a = keep_alive(&handle, &a, secs(120));
    let keep_b = keep_alive(&handle, &b, secs(120));
    tokio::join!(keep_a, keep_b);

    let still = handle.get_match(cid("a")).await.unwrap();
    assert_eq!(still, Some(room));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeating_queued_caller_stays_until_queue_timeout() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();

    keep_alive(&handle, &cid("a"), secs(55)).await;
    assert!(handle.is_queued(cid("a")).await.unwrap());
    let waited = handle.waiting_time(cid("a")).await.unwrap().unwrap();
    assert_eq!(waited, secs(55));
}

#[tokio::test(start_paused = true)]
async fn test_queue_timeout_evicts_heartbeating_caller() {
    let handle = coordinator();
    let mut rx = handle.subscribe();
    handle.join(cid("a")).await.unwrap();

    // Sweep at 60 s sees exactly 60 s of waiting (not over); 70 s evicts.
    keep_alive(&handle, &cid("a"), secs(65)).await;
    assert!(handle.is_queued(cid("a")).await.unwrap());
    sleep(secs(6)).await;

    assert!(!handle.is_queued(cid("a")).await.unwrap());
    assert_eq!(
        drain(&mut rx),
        vec![PairingEvent::Evicted {
            caller: cid("a"),
            reason: EvictionReason::QueueExpired,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stale_paired_caller_reclaimed_and_room_closed() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();
    let room = handle.join(cid("b")).await.unwrap().into_room().unwrap();
    let mut rx = handle.subscribe();

    // b keeps heartbeating, a goes silent.
    keep_alive(&handle, &cid("b"), secs(25)).await;

    assert!(handle.get_match(cid("b")).await.unwrap().is_none());
    assert_eq!(
        drain(&mut rx),
        vec![
            PairingEvent::Evicted {
                caller: cid("a"),
                reason: EvictionReason::HeartbeatExpired,
            },
            PairingEvent::RoomClosed {
                room,
                closed_by: cid("a"),
                reason: CloseReason::Reclaimed,
            },
        ]
    );
    // b is still tracked and can queue again.
    assert_eq!(handle.stats().await.unwrap().tracked, 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_just_before_sweep_spares_caller() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();

    sleep(secs(19)).await;
    handle.heartbeat(cid("a")).await.unwrap();
    // The 20 s sweep sees a 1 s old heartbeat.
    sleep(secs(2)).await;

    assert!(handle.is_queued(cid("a")).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_late_heartbeat_after_eviction_is_ignored() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();
    sleep(secs(21)).await;

    handle.heartbeat(cid("a")).await.unwrap();

    assert_eq!(handle.stats().await.unwrap().tracked, 0);
    assert!(!handle.is_queued(cid("a")).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_sweep_now_reports_evictions() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();
    // Stale after 15 s, before the 20 s periodic sweep.
    sleep(secs(16)).await;

    let evicted = handle.sweep_now().await.unwrap();

    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].caller, cid("a"));
}

// =========================================================================
// End-to-end scenario
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_scenario_end_match_then_reclaim_silent_waiter() {
    let handle = coordinator();

    // A waits.
    assert!(handle.join(cid("A")).await.unwrap().room().is_none());
    assert_eq!(handle.queue_depth().await.unwrap(), 1);

    // B pairs with A; both see the same derived room.
    let room = handle.join(cid("B")).await.unwrap().into_room().unwrap();
    assert_eq!(room.room_id(), &RoomId::for_pair(&cid("A"), &cid("B")));
    assert_eq!(room.room_id().as_str(), "room_A_B");
    let seen_by_a = handle.get_match(cid("A")).await.unwrap().unwrap();
    assert_eq!(seen_by_a.room_id(), room.room_id());

    // C waits.
    assert!(handle.join(cid("C")).await.unwrap().room().is_none());
    assert_eq!(handle.queue_depth().await.unwrap(), 1);

    // A ends the match.
    handle.end_match(cid("A")).await.unwrap();
    assert!(handle.get_match(cid("B")).await.unwrap().is_none());
    assert!(handle.is_queued(cid("C")).await.unwrap());

    // B keeps heartbeating; C goes silent past the heartbeat timeout.
    keep_alive(&handle, &cid("B"), secs(25)).await;

    assert!(!handle.is_queued(cid("C")).await.unwrap());
    assert_eq!(handle.stats().await.unwrap().tracked, 1, "B not reclaimed");
    handle.check_invariants().await.unwrap();
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_shutdown_makes_handle_unavailable() {
    let handle = coordinator();
    handle.join(cid("a")).await.unwrap();

    handle.shutdown().await.unwrap();

    assert_eq!(
        handle.join(cid("b")).await,
        Err(PairingError::Unavailable)
    );
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_closed_completes_after_shutdown() {
    let handle = coordinator();
    let watcher = handle.clone();
    let waiting = tokio::spawn(async move { watcher.closed().await });

    handle.shutdown().await.unwrap();

    waiting.await.unwrap();
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_spawn_with_huge_durations_keeps_serving() {
    let handle = spawn_coordinator(PairingConfig {
        heartbeat_timeout: Duration::MAX,
        queue_timeout: Duration::MAX,
        sweep_interval: Duration::MAX,
    });

    handle.join(cid("a")).await.unwrap();
    let room = handle.join(cid("b")).await.unwrap().into_room().unwrap();
    assert_eq!(handle.get_match(cid("a")).await.unwrap(), Some(room));
    assert!(handle.sweep_now().await.unwrap().is_empty());
    handle.check_invariants().await.unwrap();
}
