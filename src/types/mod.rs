//! Core types for the dispatch queue.

pub mod event;
pub mod request;

pub use event::QueueEvent;
pub use request::{
    EntryError, EntryPatch, QueueEntry, RequestId, RequestStatus, SCORE_INPUT_RANGE,
};
