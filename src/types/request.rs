//! Request types for the dispatch queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Valid range for the fixed scoring inputs (`vulnerability_score`,
/// `urgency_score`).
pub const SCORE_INPUT_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// Unique identifier for an aid request.
///
/// The identifier is assigned by the external record store before the entry
/// enters the heap; the scheduler treats it as an opaque stable string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Create a RequestId from an externally-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    ///
    /// Intended for callers that create entries before the record store has
    /// assigned one (and for tests).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of an aid request.
///
/// The heap holds only `Pending` entries; the other states exist solely in
/// the external record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Submitted and waiting for dispatch.
    Pending,
    /// Dispatched to a responder, delivery in progress.
    InTransit,
    /// Delivered; terminal.
    Delivered,
    /// Deliberately withdrawn; terminal.
    Cancelled,
}

impl RequestStatus {
    /// Parse status from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "IN_TRANSIT" => Some(Self::InTransit),
            "DELIVERED" => Some(Self::Delivered),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::InTransit => write!(f, "IN_TRANSIT"),
            Self::Delivered => write!(f, "DELIVERED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One pending aid request inside the scheduler.
///
/// The fixed scoring inputs (`vulnerability_score`, `urgency_score`,
/// `created_at`) are set once at creation. `priority_score` is derived and
/// recomputed on every access that matters (insert, sweep, update); it is
/// never an independent source of truth. Additional payload fields pass
/// through the scheduler unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique request identifier, stable for the entry's lifetime.
    pub id: RequestId,
    /// Vulnerability of the requester, 1-5, from a category lookup.
    pub vulnerability_score: u8,
    /// Urgency of the aid type, 1-5, from an aid-type lookup.
    pub urgency_score: u8,
    /// Submission time; the wait-time term of the score grows from here.
    pub created_at: DateTime<Utc>,
    /// Derived priority score, recomputed by the heap.
    pub priority_score: f64,
    /// Lifecycle status. Only `Pending` entries belong in the heap.
    pub status: RequestStatus,
    /// Opaque payload (name, location, ...). Passed through unmodified.
    #[serde(default)]
    pub payload: Value,
}

impl QueueEntry {
    /// Create a new pending entry.
    ///
    /// Validates the fixed scoring inputs; the priority score starts at zero
    /// and is computed when the entry enters the heap.
    pub fn new(
        id: RequestId,
        vulnerability_score: u8,
        urgency_score: u8,
        created_at: DateTime<Utc>,
    ) -> Result<Self, EntryError> {
        if !SCORE_INPUT_RANGE.contains(&vulnerability_score) {
            return Err(EntryError::VulnerabilityOutOfRange(vulnerability_score));
        }
        if !SCORE_INPUT_RANGE.contains(&urgency_score) {
            return Err(EntryError::UrgencyOutOfRange(urgency_score));
        }
        Ok(Self {
            id,
            vulnerability_score,
            urgency_score,
            created_at,
            priority_score: 0.0,
            status: RequestStatus::Pending,
            payload: Value::Null,
        })
    }

    /// Attach an opaque payload to the entry.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Partial update applied to an existing entry.
///
/// Omitted fields are left untouched. A payload that is a JSON object is
/// shallow-merged into an existing object payload; any other payload value
/// replaces the previous one wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    /// New vulnerability score, 1-5.
    pub vulnerability_score: Option<u8>,
    /// New urgency score, 1-5.
    pub urgency_score: Option<u8>,
    /// Payload changes.
    pub payload: Option<Value>,
}

impl EntryPatch {
    /// Apply the patch to an entry, validating changed scoring inputs.
    ///
    /// The entry is untouched on error.
    pub fn apply(&self, entry: &mut QueueEntry) -> Result<(), EntryError> {
        if let Some(v) = self.vulnerability_score {
            if !SCORE_INPUT_RANGE.contains(&v) {
                return Err(EntryError::VulnerabilityOutOfRange(v));
            }
        }
        if let Some(u) = self.urgency_score {
            if !SCORE_INPUT_RANGE.contains(&u) {
                return Err(EntryError::UrgencyOutOfRange(u));
            }
        }
        if let Some(v) = self.vulnerability_score {
            entry.vulnerability_score = v;
        }
        if let Some(u) = self.urgency_score {
            entry.urgency_score = u;
        }
        if let Some(patch_payload) = &self.payload {
            match (&mut entry.payload, patch_payload) {
                (Value::Object(existing), Value::Object(changes)) => {
                    for (k, v) in changes {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                (slot, other) => *slot = other.clone(),
            }
        }
        Ok(())
    }
}

/// Error for malformed scoring inputs.
///
/// Rejected before an entry enters the heap; the heap itself never sees
/// out-of-range inputs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EntryError {
    /// Vulnerability score outside the 1-5 range.
    #[error("vulnerability score {0} outside valid range 1-5")]
    VulnerabilityOutOfRange(u8),
    /// Urgency score outside the 1-5 range.
    #[error("urgency score {0} outside valid range 1-5")]
    UrgencyOutOfRange(u8),
}
