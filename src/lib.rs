//! # relief-queue
//!
//! In-memory dispatch queue for aid requests.
//!
//! The scheduler answers one question:
//!
//! > Of all pending requests, which one should the next responder take?
//!
//! ## Core Contract
//!
//! 1. Track pending requests in a mutable max-priority heap
//! 2. Score each request from fixed attributes plus elapsed wait time, so
//!    relative order drifts continuously without any entry being touched
//! 3. Keep an identifier → position index consistent with heap positions
//!    after every structural mutation
//! 4. Mirror heap contents to an external snapshot store, best-effort, for
//!    crash recovery only
//!
//! ## Architecture
//!
//! ```text
//! Enqueue/Dequeue/Update → QueueService → PriorityHeap (scores via policy)
//!                               ↓                ↓
//!                        EventPublisher    SnapshotStore (Postgres or Memory)
//! ```
//!
//! ## Concurrency Model
//!
//! Many concurrent callers, one logical owner: every heap operation is a
//! single critical section behind one mutex. Snapshot writes happen outside
//! the lock on detached tasks; their failure is logged, never surfaced.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod heap;
pub mod policy;
pub mod publish;
pub mod service;
pub mod store;
pub mod types;

// Re-exports
pub use heap::PriorityHeap;
pub use policy::{priority_score, score_entry, PriorityWeights, HIGH_PRIORITY_THRESHOLD};
pub use publish::{EventPublisher, NoOpPublisher, RecordingPublisher};
pub use service::{QueueError, QueueService, SweepHandle, DEFAULT_SWEEP_INTERVAL};
pub use store::{InMemorySnapshotStore, SnapshotError, SnapshotRecord, SnapshotStore};
#[cfg(feature = "postgres")]
pub use store::{PostgresConfig, PostgresSnapshotStore};
pub use types::{
    EntryError, EntryPatch, QueueEntry, QueueEvent, RequestId, RequestStatus, SCORE_INPUT_RANGE,
};
