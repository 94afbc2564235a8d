//! In-memory snapshot mirror for testing and single-process deployments.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{SnapshotError, SnapshotRecord, SnapshotStore};

/// In-memory snapshot mirror.
///
/// Holds the last written snapshot behind an `RwLock`. An availability
/// toggle lets tests exercise the degraded paths (failed sync, failed
/// recovery) without a real backend.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    records: RwLock<Vec<SnapshotRecord>>,
    unavailable: AtomicBool,
}

impl InMemorySnapshotStore {
    /// Create a new empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going down (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of records currently mirrored.
    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    fn check_available(&self) -> Result<(), SnapshotError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(SnapshotError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn clear(&self) -> Result<(), SnapshotError> {
        self.check_available()?;
        self.records.write().clear();
        Ok(())
    }

    async fn write_all(&self, records: &[SnapshotRecord]) -> Result<(), SnapshotError> {
        self.check_available()?;
        self.records.write().extend_from_slice(records);
        Ok(())
    }

    async fn read_all_descending(&self) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        self.check_available()?;
        let mut records = self.records.read().clone();
        records.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(records)
    }
}
