//! Snapshot mirror backends.
//!
//! The mirror is a best-effort external copy of heap contents, used only for
//! cold-start recovery. It is never a source of truth while the process is
//! alive: live reads go to the heap, and a failed mirror write is logged and
//! otherwise ignored.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{QueueEntry, RequestId, RequestStatus};

/// One mirrored entry.
///
/// Carries only the fields needed to reconstruct a [`QueueEntry`] exactly:
/// the identifier, the fixed scoring inputs, the submission time, and the
/// opaque payload. The priority score is the mirror's sort key for
/// descending retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Request identifier.
    pub id: RequestId,
    /// Fixed 1-5 vulnerability score.
    pub vulnerability_score: u8,
    /// Fixed 1-5 urgency score.
    pub urgency_score: u8,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Priority score at snapshot time; descending sort key.
    pub priority_score: f64,
    /// Opaque payload.
    #[serde(default)]
    pub payload: Value,
}

impl SnapshotRecord {
    /// Reconstruct a pending queue entry from this record.
    ///
    /// The stored score is carried over as a starting value; recovery
    /// rescores everything against the current time anyway.
    pub fn into_entry(self) -> QueueEntry {
        QueueEntry {
            id: self.id,
            vulnerability_score: self.vulnerability_score,
            urgency_score: self.urgency_score,
            created_at: self.created_at,
            priority_score: self.priority_score,
            status: RequestStatus::Pending,
            payload: self.payload,
        }
    }
}

impl From<&QueueEntry> for SnapshotRecord {
    fn from(entry: &QueueEntry) -> Self {
        Self {
            id: entry.id.clone(),
            vulnerability_score: entry.vulnerability_score,
            urgency_score: entry.urgency_score,
            created_at: entry.created_at,
            priority_score: entry.priority_score,
            payload: entry.payload.clone(),
        }
    }
}

/// Error type for mirror operations.
///
/// Mirror failures never propagate as failures of the queue operation that
/// triggered them; callers log and move on.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Backend unreachable or refused the operation.
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
    /// Record could not be (de)serialized.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for snapshot mirror backends.
///
/// Implementations must return records in descending priority-score order
/// from [`read_all_descending`](Self::read_all_descending).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Drop any prior snapshot entirely.
    async fn clear(&self) -> Result<(), SnapshotError>;

    /// Write the given records, keyed by priority score.
    async fn write_all(&self, records: &[SnapshotRecord]) -> Result<(), SnapshotError>;

    /// Read the full snapshot in descending priority order.
    async fn read_all_descending(&self) -> Result<Vec<SnapshotRecord>, SnapshotError>;

    /// Replace the snapshot wholesale: clear, then write all.
    ///
    /// Not atomic. Callers that can issue overlapping replacements must
    /// serialize them, or the clear and write phases of two replacements
    /// can interleave and leave the mirror holding records from both.
    async fn replace_all(&self, records: &[SnapshotRecord]) -> Result<(), SnapshotError> {
        self.clear().await?;
        self.write_all(records).await
    }
}

pub use memory::InMemorySnapshotStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresSnapshotStore};
