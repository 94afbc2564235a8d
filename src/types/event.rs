//! Queue-change events emitted after heap mutations.
//!
//! Events are handed to an [`EventPublisher`](crate::publish::EventPublisher)
//! fire-and-forget; the real-time fan-out to subscribers lives outside the
//! core. The serialized form carries a stable `kind` tag so downstream
//! consumers can route without deserializing the payload.

use serde::{Deserialize, Serialize};

use super::request::QueueEntry;

/// A queue-change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum QueueEvent {
    /// An entry entered the heap.
    Inserted {
        /// The entry, carrying its computed priority score.
        entry: QueueEntry,
        /// Queue size after the insert.
        size: usize,
    },
    /// An inserted entry's score crossed the high-priority threshold.
    HighPriorityAlert {
        /// The alerting entry.
        entry: QueueEntry,
    },
    /// The highest-priority entry was dispatched.
    Dequeued {
        /// The dispatched entry.
        entry: QueueEntry,
        /// Queue size after the extraction.
        size: usize,
    },
    /// An entry was withdrawn from the heap.
    Removed {
        /// The withdrawn entry.
        entry: QueueEntry,
        /// Queue size after the removal.
        size: usize,
    },
    /// An entry's fields changed and its score was recomputed.
    Updated {
        /// The entry after the update.
        entry: QueueEntry,
    },
    /// Full-queue reordering became visible (sweep, dequeue, recovery).
    QueueUpdated {
        /// All pending entries in descending priority order.
        entries: Vec<QueueEntry>,
    },
}

impl QueueEvent {
    /// Stable kind string for this event, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inserted { .. } => "inserted",
            Self::HighPriorityAlert { .. } => "high-priority-alert",
            Self::Dequeued { .. } => "dequeued",
            Self::Removed { .. } => "removed",
            Self::Updated { .. } => "updated",
            Self::QueueUpdated { .. } => "queue-updated",
        }
    }
}
