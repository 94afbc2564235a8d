//! Queue orchestration: one shared heap, snapshot sync, change events.
//!
//! [`QueueService`] wraps a single [`PriorityHeap`] as process-wide shared
//! state. It is created once at startup and handed (cloned; clones share
//! state) to every request-handling path as an explicit constructor-injected
//! dependency, never a module-level global, so tests can instantiate
//! isolated instances.
//!
//! ## Lock discipline
//!
//! Every heap operation is one critical section behind a single mutex; the
//! index-consistency invariant would be violated by interleaved sifts. The
//! only unbounded-latency step, the snapshot-store write, happens outside
//! the lock on a detached task, so slow or failing external I/O never
//! stalls scheduling. The detached writes are themselves sequenced: each
//! sync carries a generation number and an async mutex applies them one at
//! a time, skipping any sync older than the last one applied. Overlapping
//! mirror rewrites therefore cannot interleave, and a slow older write can
//! never land over a newer one. Snapshot failures are logged, never
//! propagated: the in-memory heap is authoritative while the process runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::heap::PriorityHeap;
use crate::policy::{PriorityWeights, HIGH_PRIORITY_THRESHOLD};
use crate::publish::EventPublisher;
use crate::store::{SnapshotRecord, SnapshotStore};
use crate::types::{EntryError, EntryPatch, QueueEntry, QueueEvent, RequestId, RequestStatus};

/// Default interval between periodic sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Error type for queue operations.
///
/// `Empty` and `NotFound` are normal negative results, not faults; nothing
/// in the core is a process-ending condition.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No entries are pending.
    #[error("queue is empty")]
    Empty,
    /// No pending entry carries the given id.
    #[error("request not found: {0}")]
    NotFound(RequestId),
    /// The update carried malformed scoring inputs.
    #[error(transparent)]
    InvalidEntry(#[from] EntryError),
}

/// Public-facing queue orchestration.
///
/// Must run inside a tokio runtime: mutations hand the snapshot write to a
/// detached task.
pub struct QueueService {
    heap: Arc<Mutex<PriorityHeap>>,
    snapshot: Arc<dyn SnapshotStore>,
    publisher: Arc<dyn EventPublisher>,
    /// Generation counter for snapshot syncs. Incremented under the heap
    /// lock together with the record capture, so generation order matches
    /// capture order.
    sync_seq: Arc<AtomicU64>,
    /// Generation of the last snapshot applied to the mirror. The async
    /// mutex serializes mirror rewrites; syncs at or below this generation
    /// are skipped.
    sync_applied: Arc<AsyncMutex<u64>>,
}

impl QueueService {
    /// Create a service with default scoring weights.
    pub fn new(snapshot: Arc<dyn SnapshotStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_weights(PriorityWeights::default(), snapshot, publisher)
    }

    /// Create a service with explicit scoring weights.
    pub fn with_weights(
        weights: PriorityWeights,
        snapshot: Arc<dyn SnapshotStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            heap: Arc::new(Mutex::new(PriorityHeap::with_weights(weights))),
            snapshot,
            publisher,
            sync_seq: Arc::new(AtomicU64::new(0)),
            sync_applied: Arc::new(AsyncMutex::new(0)),
        }
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Insert a new pending request.
    ///
    /// Returns the entry carrying its computed priority score. Fires a
    /// best-effort snapshot sync and emits `inserted`, plus
    /// `high-priority-alert` when the score crosses the threshold. A failed
    /// sync does not roll back the insert.
    pub fn enqueue(&self, entry: QueueEntry) -> QueueEntry {
        let now = Utc::now();
        let (stored, size) = {
            let mut heap = self.heap.lock();
            let stored = heap.insert(entry, now);
            (stored, heap.len())
        };

        self.spawn_snapshot_sync();
        self.publisher.publish(QueueEvent::Inserted {
            entry: stored.clone(),
            size,
        });
        if stored.priority_score >= HIGH_PRIORITY_THRESHOLD {
            info!(id = %stored.id, score = stored.priority_score, "high-priority request enqueued");
            self.publisher.publish(QueueEvent::HighPriorityAlert {
                entry: stored.clone(),
            });
        }
        stored
    }

    /// Re-insert an entry whose status reverted to pending (e.g. a failed
    /// dispatch). Identical mechanics to [`enqueue`](Self::enqueue).
    pub fn requeue(&self, mut entry: QueueEntry) -> QueueEntry {
        entry.status = RequestStatus::Pending;
        self.enqueue(entry)
    }

    /// Remove and return the highest-priority entry.
    ///
    /// The caller is responsible for durably transitioning the dispatched
    /// entry's status; the service syncs the snapshot and emits `dequeued`
    /// plus a full `queue-updated`.
    pub fn dequeue(&self) -> Result<QueueEntry, QueueError> {
        let (entry, ordered, size) = {
            let mut heap = self.heap.lock();
            let Some(entry) = heap.extract_max() else {
                return Err(QueueError::Empty);
            };
            (entry, heap.to_sorted_vec(), heap.len())
        };

        self.spawn_snapshot_sync();
        self.publisher.publish(QueueEvent::Dequeued {
            entry: entry.clone(),
            size,
        });
        self.publisher
            .publish(QueueEvent::QueueUpdated { entries: ordered });
        Ok(entry)
    }

    /// Return the highest-priority entry without removing it.
    pub fn peek(&self) -> Result<QueueEntry, QueueError> {
        self.heap.lock().peek().cloned().ok_or(QueueError::Empty)
    }

    /// Withdraw a pending entry by id.
    pub fn remove_by_id(&self, id: &RequestId) -> Result<QueueEntry, QueueError> {
        let (entry, size) = {
            let mut heap = self.heap.lock();
            let Some(entry) = heap.remove_by_id(id) else {
                return Err(QueueError::NotFound(id.clone()));
            };
            (entry, heap.len())
        };

        self.spawn_snapshot_sync();
        self.publisher.publish(QueueEvent::Removed {
            entry: entry.clone(),
            size,
        });
        Ok(entry)
    }

    /// Merge a partial update into a pending entry and re-sift it.
    pub fn update_by_id(&self, id: &RequestId, patch: &EntryPatch) -> Result<QueueEntry, QueueError> {
        let now = Utc::now();
        let entry = {
            let mut heap = self.heap.lock();
            heap.update_by_id(id, patch, now)?
                .ok_or_else(|| QueueError::NotFound(id.clone()))?
        };

        self.spawn_snapshot_sync();
        self.publisher.publish(QueueEvent::Updated {
            entry: entry.clone(),
        });
        Ok(entry)
    }

    /// Rescore everything at the current time and return all entries in
    /// descending priority order.
    ///
    /// This reorders the shared heap as a side effect; see
    /// [`PriorityHeap::all_ordered`].
    pub fn all_ordered(&self) -> Vec<QueueEntry> {
        self.heap.lock().all_ordered(Utc::now())
    }

    /// Full rescoring pass against `now`, then a `queue-updated` event so
    /// wait-time-driven reordering becomes visible without new submissions.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let ordered = {
            let mut heap = self.heap.lock();
            heap.recompute_all(now);
            heap.to_sorted_vec()
        };
        debug!(size = ordered.len(), "sweep rescored queue");
        self.publisher
            .publish(QueueEvent::QueueUpdated { entries: ordered });
    }

    /// Cold-start recovery from entries fetched out of the durable store.
    ///
    /// Non-pending entries are skipped; the heap holds pending requests
    /// only. Duplicate ids in the source collapse to their first occurrence
    /// (see [`PriorityHeap::load_from_collection`]). Returns the number of
    /// entries actually restored.
    pub fn recover(&self, entries: Vec<QueueEntry>) -> usize {
        let now = Utc::now();
        let pending: Vec<_> = entries
            .into_iter()
            .filter(|e| e.status == RequestStatus::Pending)
            .collect();

        let ordered = {
            let mut heap = self.heap.lock();
            heap.load_from_collection(pending, now);
            heap.to_sorted_vec()
        };
        let count = ordered.len();
        info!(size = count, "queue recovered from collection");
        self.publisher
            .publish(QueueEvent::QueueUpdated { entries: ordered });
        count
    }

    /// Cold-start recovery from the snapshot mirror.
    ///
    /// If the mirror is unreachable the service starts with an empty heap,
    /// a degraded but valid state rather than a fatal error. Returns the
    /// number of entries restored into the heap, which can be lower than
    /// the mirror's record count when the mirror holds duplicates.
    pub async fn recover_from_mirror(&self) -> usize {
        match self.snapshot.read_all_descending().await {
            Ok(records) => {
                self.recover(records.into_iter().map(|r| r.into_entry()).collect())
            }
            Err(err) => {
                warn!(error = %err, "snapshot mirror unavailable; starting with empty queue");
                0
            }
        }
    }

    /// Mirror the full ordered heap contents into the snapshot store,
    /// replacing any prior snapshot entirely.
    ///
    /// Best-effort: failure is logged and swallowed. Goes through the same
    /// sequencing as the detached per-mutation syncs, so a detached write
    /// can neither interleave with this one nor land over it afterwards.
    pub async fn snapshot_all(&self) {
        let (seq, records) = self.snapshot_records();
        Self::apply_snapshot(&self.sync_applied, self.snapshot.as_ref(), seq, &records).await;
    }

    /// Start the periodic sweep task. The first sweep fires one interval
    /// after start. Shut the handle down at process exit.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweepHandle {
        let service = self.clone();
        let shutdown = Arc::new(Notify::new());
        let shutdown_rx = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // An interval's first tick completes immediately; consume it so
            // the first sweep happens after one full interval.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => service.sweep(Utc::now()),
                    _ = shutdown_rx.notified() => break,
                }
            }
            debug!("sweeper stopped");
        });

        SweepHandle { shutdown, handle }
    }

    /// Snapshot of the heap as mirror records plus its sync generation,
    /// both taken under the same lock acquisition.
    fn snapshot_records(&self) -> (u64, Vec<SnapshotRecord>) {
        let heap = self.heap.lock();
        let seq = self.sync_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let records = heap.to_sorted_vec().iter().map(SnapshotRecord::from).collect();
        (seq, records)
    }

    /// Hand the mirror write to a detached task, outside the lock.
    fn spawn_snapshot_sync(&self) {
        let (seq, records) = self.snapshot_records();
        let store = Arc::clone(&self.snapshot);
        let applied = Arc::clone(&self.sync_applied);
        tokio::spawn(async move {
            Self::apply_snapshot(&applied, store.as_ref(), seq, &records).await;
        });
    }

    /// Apply one captured snapshot to the mirror, in generation order.
    ///
    /// The mutex makes rewrites mutually exclusive; the generation check
    /// drops any capture older than the last one applied. A failed write
    /// does not advance the applied generation, so the next sync retries
    /// with fresher records.
    async fn apply_snapshot(
        applied: &AsyncMutex<u64>,
        store: &dyn SnapshotStore,
        seq: u64,
        records: &[SnapshotRecord],
    ) {
        let mut last = applied.lock().await;
        if seq <= *last {
            return;
        }
        match store.replace_all(records).await {
            Ok(()) => *last = seq,
            Err(err) => {
                warn!(error = %err, "snapshot sync failed; in-memory queue remains authoritative");
            }
        }
    }
}

impl Clone for QueueService {
    fn clone(&self) -> Self {
        Self {
            heap: Arc::clone(&self.heap),
            snapshot: Arc::clone(&self.snapshot),
            publisher: Arc::clone(&self.publisher),
            sync_seq: Arc::clone(&self.sync_seq),
            sync_applied: Arc::clone(&self.sync_applied),
        }
    }
}

/// Handle to the periodic sweep task.
pub struct SweepHandle {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl SweepHandle {
    /// Stop the sweeper and wait for the task to finish.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        let _ = self.handle.await;
    }
}
