//! Priority policy: scoring weights and thresholds.

pub mod scoring;

use serde::{Deserialize, Serialize};

pub use scoring::{priority_score, score_entry};

/// Priority score at or above which an insert additionally emits a
/// high-priority alert event.
pub const HIGH_PRIORITY_THRESHOLD: f64 = 50.0;

/// Weights for the priority formula.
///
/// The fixed inputs dominate: a maximally vulnerable, maximally urgent
/// request starts at 75.0, a minimal one at 15.0. The wait term then adds
/// 0.1 per minute so that no request starves forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    /// Weight applied to the 1-5 vulnerability score.
    pub vulnerability: f64,
    /// Weight applied to the 1-5 urgency score.
    pub urgency: f64,
    /// Weight applied to elapsed wait, in points per minute.
    pub wait_minutes: f64,
}

impl PriorityWeights {
    /// Create explicit weights.
    pub fn new(vulnerability: f64, urgency: f64, wait_minutes: f64) -> Self {
        Self {
            vulnerability,
            urgency,
            wait_minutes,
        }
    }
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            vulnerability: 5.0,
            urgency: 10.0,
            wait_minutes: 0.1,
        }
    }
}
