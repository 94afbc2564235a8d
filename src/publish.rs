//! Event publishing seam.
//!
//! The real-time fan-out of queue-change notifications to subscribers lives
//! outside the core; the core only calls [`EventPublisher::publish`] after
//! each mutation, fire-and-forget. No acknowledgment is required.

use parking_lot::Mutex;

use crate::types::QueueEvent;

/// Trait for notification publishers.
///
/// Implementations must not block: `publish` is called while no heap lock is
/// held, but a slow publisher would still delay the calling task.
pub trait EventPublisher: Send + Sync {
    /// Publish one queue-change event.
    fn publish(&self, event: QueueEvent);
}

/// Publisher that drops every event. Useful when no subscribers exist.
#[derive(Debug, Default)]
pub struct NoOpPublisher;

impl EventPublisher for NoOpPublisher {
    fn publish(&self, _event: QueueEvent) {}
}

/// Publisher that records every event for later inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<QueueEvent>>,
}

impl RecordingPublisher {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, in order.
    pub fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().clone()
    }

    /// Kind strings of all events published so far, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.kind()).collect()
    }

    /// Drop all recorded events.
    pub fn reset(&self) {
        self.events.lock().clear();
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: QueueEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QueueEntry, RequestId};
    use chrono::Utc;

    #[test]
    fn test_recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::new();
        let entry = QueueEntry::new(RequestId::new("r1"), 3, 3, Utc::now()).unwrap();

        publisher.publish(QueueEvent::Inserted {
            entry: entry.clone(),
            size: 1,
        });
        publisher.publish(QueueEvent::Dequeued { entry, size: 0 });

        assert_eq!(publisher.kinds(), ["inserted", "dequeued"]);
        publisher.reset();
        assert!(publisher.events().is_empty());
    }
}
