//! Integration tests for the dispatch queue: end-to-end behavior through
//! `QueueService`.
//!
//! These tests validate the full pipeline:
//! 1. Scoring at enqueue time
//! 2. Dispatch ordering under mixed submissions
//! 3. Point removal and update
//! 4. Wait-time-driven reordering via sweep
//! 5. Snapshot mirroring and crash recovery
//! 6. Event emission per mutation

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use relief_queue::{
    EntryPatch, EventPublisher, InMemorySnapshotStore, QueueEntry, QueueError, QueueEvent,
    QueueService, RecordingPublisher, RequestId, RequestStatus, SnapshotRecord, SnapshotStore,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn make_entry(id: &str, vulnerability: u8, urgency: u8, age_minutes: i64) -> QueueEntry {
    QueueEntry::new(
        RequestId::new(id),
        vulnerability,
        urgency,
        Utc::now() - Duration::minutes(age_minutes),
    )
    .unwrap()
}

fn make_service() -> (
    QueueService,
    Arc<InMemorySnapshotStore>,
    Arc<RecordingPublisher>,
) {
    init_tracing();
    let store = Arc::new(InMemorySnapshotStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let service = QueueService::new(
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
    );
    (service, store, publisher)
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoring and dispatch order
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_worked_example_scores_order_and_dispatch() {
    let (service, _store, _publisher) = make_service();

    let a = service.enqueue(make_entry("A", 4, 5, 0));
    let b = service.enqueue(make_entry("B", 1, 2, 0));
    let c = service.enqueue(make_entry("C", 4, 5, 10));

    assert_eq!(a.priority_score, 70.0);
    assert_eq!(b.priority_score, 25.0);
    assert_eq!(c.priority_score, 71.0);

    let ordered = service.all_ordered();
    let ids: Vec<_> = ordered.iter().map(|e| e.id.as_str().to_string()).collect();
    assert_eq!(ids, ["C", "A", "B"]);

    let dispatched = service.dequeue().unwrap();
    assert_eq!(dispatched.id.as_str(), "C");
    assert_eq!(service.len(), 2);
    assert_eq!(service.peek().unwrap().id.as_str(), "A");

    // Withdrawing B leaves exactly A, findable and at the root.
    service.remove_by_id(&RequestId::new("B")).unwrap();
    assert_eq!(service.len(), 1);
    assert_eq!(service.peek().unwrap().id.as_str(), "A");
}

#[tokio::test]
async fn test_full_drain_is_non_increasing() {
    let (service, _store, _publisher) = make_service();

    for (i, (v, u, age)) in [
        (3, 4, 12),
        (5, 2, 90),
        (1, 5, 3),
        (4, 4, 45),
        (2, 1, 300),
        (5, 5, 0),
        (1, 1, 600),
    ]
    .iter()
    .enumerate()
    {
        service.enqueue(make_entry(&format!("r{i}"), *v, *u, *age));
    }

    let mut last = f64::INFINITY;
    while let Ok(entry) = service.dequeue() {
        assert!(entry.priority_score <= last);
        last = entry.priority_score;
    }
    assert!(matches!(service.dequeue(), Err(QueueError::Empty)));
}

#[tokio::test]
async fn test_payload_passes_through_unmodified() {
    let (service, _store, _publisher) = make_service();

    let entry = make_entry("r1", 4, 5, 0)
        .with_payload(json!({"name": "Amara", "location": "sector 7", "aid_type": "water"}));
    service.enqueue(entry);

    let dispatched = service.dequeue().unwrap();
    assert_eq!(dispatched.payload["name"], "Amara");
    assert_eq!(dispatched.payload["location"], "sector 7");
}

// ─────────────────────────────────────────────────────────────────────────────
// Sweep: reordering from elapsed time alone
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sweep_credits_wait_time_without_new_submissions() {
    let (service, _store, publisher) = make_service();
    let now = Utc::now();

    service.enqueue(QueueEntry::new(RequestId::new("fresh"), 3, 3, now).unwrap());
    service.enqueue(
        QueueEntry::new(
            RequestId::new("waiting"),
            2,
            3,
            now - Duration::minutes(30),
        )
        .unwrap(),
    );
    // 45.0 vs 40.0 + 3.0 wait credit.
    assert_eq!(service.peek().unwrap().priority_score, 45.0);
    publisher.reset();

    service.sweep(now + Duration::minutes(40));

    // Both entries grew by 4.0; the refreshed order is published in full.
    assert_eq!(service.peek().unwrap().priority_score, 49.0);
    assert_eq!(publisher.kinds(), ["queue-updated"]);
    match &publisher.events()[0] {
        QueueEvent::QueueUpdated { entries } => {
            assert_eq!(entries[0].id.as_str(), "fresh");
            assert_eq!(entries[0].priority_score, 49.0);
            assert_eq!(entries[1].id.as_str(), "waiting");
            assert_eq!(entries[1].priority_score, 47.0);
        }
        other => panic!("unexpected event: {}", other.kind()),
    }
}

#[tokio::test]
async fn test_accumulated_wait_outranks_higher_base_score() {
    let (service, _store, _publisher) = make_service();

    // Two hours of waiting (12.0) lifts a lower-severity request past a
    // fresh one with a higher base: 40 + 12 > 45.
    service.enqueue(make_entry("patient", 2, 3, 120));
    service.enqueue(make_entry("louder", 3, 3, 0));

    let ordered = service.all_ordered();
    assert_eq!(ordered[0].id.as_str(), "patient");
    assert!(ordered[0].priority_score >= 52.0);
    assert_eq!(service.dequeue().unwrap().id.as_str(), "patient");
}

#[tokio::test]
async fn test_periodic_sweeper_runs_and_stops() {
    let (service, _store, publisher) = make_service();
    service.enqueue(make_entry("r1", 3, 3, 0));
    publisher.reset();

    let handle = service.spawn_sweeper(std::time::Duration::from_millis(20));
    tokio::time::sleep(std::time::Duration::from_millis(110)).await;
    handle.shutdown().await;

    let sweeps = publisher
        .kinds()
        .iter()
        .filter(|k| **k == "queue-updated")
        .count();
    assert!(sweeps >= 2, "expected at least two sweeps, saw {sweeps}");

    // No more sweeps after shutdown.
    publisher.reset();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(publisher.events().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot mirroring and recovery
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_mutations_sync_snapshot_in_background() {
    let (service, store, _publisher) = make_service();

    service.enqueue(make_entry("a", 4, 5, 0));
    service.enqueue(make_entry("b", 1, 2, 0));
    service.dequeue().unwrap();

    // The mirror writes are detached; give them a beat to land.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let records = store.read_all_descending().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id.as_str(), "b");
}

#[tokio::test]
async fn test_crash_recovery_round_trip() {
    let (service, store, _publisher) = make_service();

    service.enqueue(
        make_entry("urgent", 4, 5, 10).with_payload(json!({"aid_type": "medical"})),
    );
    service.enqueue(make_entry("routine", 1, 2, 0));
    service.snapshot_all().await;

    // Process restart: a fresh service against the same mirror.
    let publisher2 = Arc::new(RecordingPublisher::new());
    let restarted = QueueService::new(
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
        Arc::clone(&publisher2) as Arc<dyn EventPublisher>,
    );

    let loaded = restarted.recover_from_mirror().await;
    assert_eq!(loaded, 2);
    assert_eq!(restarted.len(), 2);

    let head = restarted.peek().unwrap();
    assert_eq!(head.id.as_str(), "urgent");
    assert_eq!(head.payload["aid_type"], "medical");
    assert_eq!(publisher2.kinds(), ["queue-updated"]);
}

#[tokio::test]
async fn test_unavailable_mirror_never_blocks_live_operations() {
    let (service, store, _publisher) = make_service();
    store.set_unavailable(true);

    service.enqueue(make_entry("a", 4, 5, 0));
    service.enqueue(make_entry("b", 1, 2, 0));
    assert_eq!(service.dequeue().unwrap().id.as_str(), "a");
    assert_eq!(service.len(), 1);

    // The explicit sync carries the highest generation: any detached sync
    // still in flight is applied before it or skipped after it.
    store.set_unavailable(false);
    service.snapshot_all().await;
    assert_eq!(store.record_count(), 1);
}

#[tokio::test]
async fn test_recovery_from_duplicated_mirror_dispatches_each_request_once() {
    let (service, store, _publisher) = make_service();

    // A mirror backend that was rewritten by two interleaved writers can
    // end up holding every request twice. Recovery must collapse the
    // duplicates: one heap slot and one dispatch per request id.
    let a = make_entry("a", 4, 5, 0);
    let b = make_entry("b", 1, 2, 0);
    store
        .write_all(&[
            SnapshotRecord::from(&a),
            SnapshotRecord::from(&b),
            SnapshotRecord::from(&a),
            SnapshotRecord::from(&b),
        ])
        .await
        .unwrap();

    let restored = service.recover_from_mirror().await;
    assert_eq!(restored, 2);
    assert_eq!(service.len(), 2);

    assert_eq!(service.dequeue().unwrap().id.as_str(), "a");
    assert_eq!(service.dequeue().unwrap().id.as_str(), "b");
    assert!(matches!(service.dequeue(), Err(QueueError::Empty)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Requeue and update lifecycles
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_dispatch_requeues_with_original_created_at() {
    let (service, _store, _publisher) = make_service();

    service.enqueue(make_entry("r1", 4, 5, 10));
    let mut dispatched = service.dequeue().unwrap();
    assert!(service.is_empty());

    // Dispatch fails out in the field; the entry comes back pending with
    // its original submission time, so its accumulated wait is kept.
    dispatched.status = RequestStatus::InTransit;
    let requeued = service.requeue(dispatched);

    assert_eq!(requeued.status, RequestStatus::Pending);
    assert!(requeued.priority_score >= 71.0);
    assert_eq!(service.len(), 1);
}

#[tokio::test]
async fn test_update_changes_dispatch_order() {
    let (service, _store, publisher) = make_service();

    service.enqueue(make_entry("a", 2, 2, 0));
    service.enqueue(make_entry("b", 3, 3, 0));
    assert_eq!(service.peek().unwrap().id.as_str(), "b");
    publisher.reset();

    let patch = EntryPatch {
        vulnerability_score: Some(5),
        urgency_score: Some(5),
        payload: None,
    };
    service.update_by_id(&RequestId::new("a"), &patch).unwrap();

    assert_eq!(service.peek().unwrap().id.as_str(), "a");
    assert_eq!(publisher.kinds(), ["updated"]);

    let missing = service.update_by_id(&RequestId::new("ghost"), &patch);
    assert!(matches!(missing, Err(QueueError::NotFound(_))));
}
