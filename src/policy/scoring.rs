//! Priority scoring for pending aid requests.

use chrono::{DateTime, Utc};

use super::PriorityWeights;
use crate::types::QueueEntry;

/// Compute the priority score for a request at a given instant.
///
/// Higher score = dispatched sooner.
///
/// Formula:
/// ```text
/// score = vulnerability * W_v + urgency * W_u + wait_minutes * W_t
/// ```
///
/// The wait term is clamped at zero so clock skew between the submitting
/// host and the scheduler can never produce a negative contribution. The
/// result is rounded to two decimals; all comparisons inside the heap use
/// this rounded value, so repeated calls with identical inputs at the same
/// instant are deterministic.
///
/// ## Parameters
///
/// - `vulnerability`: fixed 1-5 category score
/// - `urgency`: fixed 1-5 aid-type score
/// - `created_at`: submission time
/// - `now`: the shared "current time" for this scoring pass
/// - `weights`: scoring weights
pub fn priority_score(
    vulnerability: u8,
    urgency: u8,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    weights: &PriorityWeights,
) -> f64 {
    let wait_minutes = ((now - created_at).num_seconds() as f64 / 60.0).max(0.0);

    let raw = f64::from(vulnerability) * weights.vulnerability
        + f64::from(urgency) * weights.urgency
        + wait_minutes * weights.wait_minutes;

    round2(raw)
}

/// Score an entry's fixed fields at `now`.
pub fn score_entry(entry: &QueueEntry, now: DateTime<Utc>, weights: &PriorityWeights) -> f64 {
    priority_score(
        entry.vulnerability_score,
        entry.urgency_score,
        entry.created_at,
        now,
        weights,
    )
}

/// Round to two decimal places for display/storage stability.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_base_score_from_fixed_inputs() {
        let now = Utc::now();
        let weights = PriorityWeights::default();

        // 4*5 + 5*10 + 0*0.1
        assert_eq!(priority_score(4, 5, now, now, &weights), 70.0);
        // 1*5 + 2*10
        assert_eq!(priority_score(1, 2, now, now, &weights), 25.0);
    }

    #[test]
    fn test_wait_time_adds_tenth_per_minute() {
        let now = Utc::now();
        let weights = PriorityWeights::default();

        let created = now - Duration::minutes(10);
        assert_eq!(priority_score(4, 5, created, now, &weights), 71.0);
    }

    #[test]
    fn test_future_created_at_clamped() {
        let now = Utc::now();
        let weights = PriorityWeights::default();

        // Entry stamped ahead of the scheduler's clock scores as zero wait.
        let created = now + Duration::minutes(30);
        assert_eq!(priority_score(3, 3, created, now, &weights), 45.0);
    }

    #[test]
    fn test_rounded_to_two_decimals() {
        let now = Utc::now();
        let weights = PriorityWeights::default();

        // 90 seconds = 1.5 minutes -> 0.15 wait term
        let created = now - Duration::seconds(90);
        let score = priority_score(1, 1, created, now, &weights);
        assert_eq!(score, 15.15);
    }

    #[test]
    fn test_deterministic_for_fixed_instant() {
        let now = Utc::now();
        let created = now - Duration::minutes(7);
        let weights = PriorityWeights::default();

        let a = priority_score(5, 5, created, now, &weights);
        let b = priority_score(5, 5, created, now, &weights);
        assert_eq!(a, b);
    }
}
