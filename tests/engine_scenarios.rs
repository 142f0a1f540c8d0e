//! End-to-end scenarios for the replication engine
//!
//! Drives the full loop (replicate, drain, resolve, notify) the way the
//! simulated clients do, and checks the partition and lifecycle behavior.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{json, Value};

use georep::{
    ApplyCallback, ConflictType, EngineConfig, EngineNotification, EventKind, GeorepError,
    RegionHealth, ReplicationEngine, ReplicationEvent, ResolutionStrategy,
};

type Applied = Arc<Mutex<Vec<(String, Value)>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("georep=debug")
        .with_test_writer()
        .try_init();
}

fn recording_engine() -> (Arc<ReplicationEngine>, Applied) {
    init_tracing();
    let applied: Applied = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&applied);
    let apply: ApplyCallback = Box::new(move |payload, _kind, id| {
        sink.lock().push((id.to_string(), payload.clone()));
        Ok(())
    });
    (
        Arc::new(ReplicationEngine::new(EngineConfig::default(), apply)),
        applied,
    )
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn event(
    id: &str,
    kind: EventKind,
    payload: Value,
    origin: &str,
    targets: &[&str],
) -> ReplicationEvent {
    ReplicationEvent::new(
        id,
        kind,
        payload,
        origin,
        targets.iter().map(|t| t.to_string()).collect(),
    )
}

/// Scenario: two regions write the same record at almost the same moment,
/// each targeting the other. The later wall-clock write wins.
#[test]
fn concurrent_writes_resolve_last_writer_wins() {
    let (engine, applied) = recording_engine();
    let base = now_ms();

    engine
        .replicate(
            event(
                "tweet-1",
                EventKind::RecordUpdate,
                json!({"content": "A"}),
                "us-east",
                &["us-east", "eu-west"],
            )
            .at(base),
        )
        .unwrap();
    engine
        .replicate(
            event(
                "tweet-1",
                EventKind::RecordUpdate,
                json!({"content": "B"}),
                "eu-west",
                &["us-east", "eu-west"],
            )
            .at(base + 100),
        )
        .unwrap();

    let mut notifications = engine.subscribe();
    engine.tick();

    // Both events landed in eu-west's queue (us-east is the local region and
    // excluded from fan-out), so the conflict materializes there once.
    let applied = applied.lock();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].0, "tweet-1");
    assert_eq!(applied[0].1, json!({"content": "B"}));

    match notifications.try_recv() {
        Ok(EngineNotification::ConflictResolved { region, resolution }) => {
            assert_eq!(region, "eu-west");
            assert_eq!(resolution.conflict_type, ConflictType::ConcurrentUpdate);
            assert_eq!(resolution.strategy, ResolutionStrategy::LastWriterWins);
            assert_eq!(resolution.resolved, Some(json!({"content": "B"})));
        }
        other => panic!("expected ConflictResolved, got {other:?}"),
    }
}

/// Scenario: one region appends to a follower set twice before the first
/// write lands remotely. The causally ordered pair merges by set union.
#[test]
fn relationship_adds_merge_follower_sets() {
    let (engine, applied) = recording_engine();

    engine
        .replicate(event(
            "user-42-followers",
            EventKind::RelationshipAdd,
            json!({"followers": ["u1", "u2"]}),
            "eu-west",
            &["asia-pacific"],
        ))
        .unwrap();
    engine
        .replicate(event(
            "user-42-followers",
            EventKind::RelationshipAdd,
            json!({"followers": ["u2", "u3"]}),
            "eu-west",
            &["asia-pacific"],
        ))
        .unwrap();

    let mut notifications = engine.subscribe();
    engine.tick();

    let applied = applied.lock();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].1, json!({"followers": ["u1", "u2", "u3"]}));

    match notifications.try_recv() {
        Ok(EngineNotification::ConflictResolved { resolution, .. }) => {
            assert_eq!(resolution.strategy, ResolutionStrategy::Merge);
        }
        other => panic!("expected ConflictResolved, got {other:?}"),
    }
}

/// Scenario: a single event with a fresh identity applies directly, without
/// the resolver, and its clock folds into the engine's clock.
#[test]
fn singleton_event_applies_directly() {
    let (engine, applied) = recording_engine();

    engine
        .replicate(event(
            "tweet-77",
            EventKind::RecordCreate,
            json!({"content": "fresh"}),
            "eu-west",
            &["asia-pacific"],
        ))
        .unwrap();
    engine.tick();

    let applied = applied.lock();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].0, "tweet-77");

    let stats = engine.stats();
    assert_eq!(stats.events_applied, 1);
    assert_eq!(stats.conflicts_detected, 0);
    assert_eq!(engine.current_clock().get("eu-west"), 1);
}

/// A partitioned region accumulates events and drains every one of them
/// exactly once after recovery.
#[tokio::test(start_paused = true)]
async fn partition_does_not_drop_events() {
    let (engine, applied) = recording_engine();
    let mut notifications = engine.subscribe();

    for i in 0..5 {
        engine
            .replicate(event(
                &format!("tweet-{i}"),
                EventKind::RecordCreate,
                json!({"n": i}),
                "us-east",
                &["eu-west"],
            ))
            .unwrap();
    }

    engine
        .simulate_partition("eu-west", Duration::from_secs(10))
        .unwrap();
    assert_eq!(
        engine.region("eu-west").unwrap().health,
        RegionHealth::Partitioned
    );

    engine.tick();
    assert_eq!(engine.pending_events("eu-west").unwrap(), 5);
    assert!(applied.lock().is_empty());

    // Let the simulated outage elapse; the deferred restoration fires.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(
        engine.region("eu-west").unwrap().health,
        RegionHealth::Active
    );

    engine.tick();
    assert_eq!(engine.pending_events("eu-west").unwrap(), 0);
    assert_eq!(applied.lock().len(), 5);

    // Drained exactly once: another tick applies nothing further.
    engine.tick();
    assert_eq!(applied.lock().len(), 5);

    assert!(matches!(
        notifications.try_recv(),
        Ok(EngineNotification::PartitionStarted { .. })
    ));
    assert!(matches!(
        notifications.try_recv(),
        Ok(EngineNotification::PartitionRecovered { .. })
    ));
}

/// Stopping the engine cancels a pending partition restoration.
#[tokio::test(start_paused = true)]
async fn stop_cancels_pending_partition_recovery() {
    let (engine, _) = recording_engine();

    engine.clone().start().unwrap();
    engine
        .simulate_partition("eu-west", Duration::from_secs(10))
        .unwrap();
    engine.stop().unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(
        engine.region("eu-west").unwrap().health,
        RegionHealth::Partitioned,
        "recovery timer should have been cancelled by stop"
    );
}

/// The background loop drains queues on its own once started.
#[tokio::test(start_paused = true)]
async fn background_loop_drains_on_interval() {
    let (engine, applied) = recording_engine();

    engine.clone().start().unwrap();
    engine
        .replicate(event(
            "tweet-1",
            EventKind::RecordCreate,
            json!({"content": "hello"}),
            "eu-west",
            &["asia-pacific"],
        ))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(applied.lock().len(), 1);

    engine.stop().unwrap();
}

/// Lifecycle misuse is reported, not ignored.
#[tokio::test]
async fn lifecycle_errors() {
    let (engine, _) = recording_engine();

    engine.clone().start().unwrap();
    assert!(matches!(
        engine.clone().start(),
        Err(GeorepError::AlreadyRunning)
    ));

    engine.stop().unwrap();
    assert!(matches!(engine.stop(), Err(GeorepError::NotRunning)));
}

/// A conflict type routed to manual resolution is surfaced distinctly and
/// mutates nothing.
#[test]
fn manual_resolution_is_surfaced_distinctly() {
    let (engine, applied) = recording_engine();
    engine.clear_strategy(ConflictType::ConcurrentUpdate);

    engine
        .replicate(event(
            "tweet-1",
            EventKind::RecordUpdate,
            json!({"content": "A"}),
            "eu-west",
            &["asia-pacific"],
        ))
        .unwrap();
    engine
        .replicate(event(
            "tweet-1",
            EventKind::RecordUpdate,
            json!({"content": "B"}),
            "asia-pacific",
            &["asia-pacific"],
        ))
        .unwrap();

    let mut notifications = engine.subscribe();
    engine.tick();

    assert!(applied.lock().is_empty());
    let stats = engine.stats();
    assert_eq!(stats.manual_resolutions, 1);
    assert_eq!(stats.conflicts_resolved, 0);
    // The undecided group must not have advanced the region's causal view.
    assert_eq!(engine.region_clock("asia-pacific").unwrap().get("eu-west"), 0);

    match notifications.try_recv() {
        Ok(EngineNotification::ManualResolutionRequired { resolution, .. }) => {
            assert_eq!(resolution.strategy, ResolutionStrategy::ManualResolve);
            assert_eq!(resolution.resolved, None);
        }
        other => panic!("expected ManualResolutionRequired, got {other:?}"),
    }
}
