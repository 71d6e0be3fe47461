use chrono::Utc;
use tandem_schemas::{HealthScore, HealthSignals};

// Fixed weights over the five normalized signals; they sum to 1.0.
pub const COMMUNICATION_WEIGHT: f64 = 0.25;
pub const SENTIMENT_WEIGHT: f64 = 0.30;
pub const CONFLICT_WEIGHT: f64 = 0.20;
pub const INTIMACY_WEIGHT: f64 = 0.15;
pub const RESPONSIVENESS_WEIGHT: f64 = 0.10;

/// Combine the five raw relationship signals into a single 0-10 score.
///
/// Inputs are not bounds-checked; each normalized term is clamped into
/// [0, 1] so negative or oversized inputs degrade the score instead of
/// breaking it. Pure function, no side effects.
pub fn health_score(signals: &HealthSignals) -> f64 {
    // Normalization rules are fixed:
    //   communication: min(freq / 50, 1)      - 50 msgs/day saturates
    //   sentiment:     (avg + 1) / 2          - [-1,1] -> [0,1]
    //   conflict:      max(0, 1 - freq / 10)  - inverted, 10/week floors it
    //   intimacy:      min(count / 10, 1)
    //   responsiveness: min(ratio, 1)
    let communication = (signals.messages_per_day / 50.0).clamp(0.0, 1.0);
    let sentiment = ((signals.average_sentiment + 1.0) / 2.0).clamp(0.0, 1.0);
    let conflict = (1.0 - signals.conflicts_per_week / 10.0).clamp(0.0, 1.0);
    let intimacy = (signals.intimacy_markers / 10.0).clamp(0.0, 1.0);
    let responsiveness = signals.responsiveness.clamp(0.0, 1.0);

    let weighted = communication * COMMUNICATION_WEIGHT
        + sentiment * SENTIMENT_WEIGHT
        + conflict * CONFLICT_WEIGHT
        + intimacy * INTIMACY_WEIGHT
        + responsiveness * RESPONSIVENESS_WEIGHT;

    round2((weighted * 10.0).clamp(0.0, 10.0))
}

/// Score plus the calculation timestamp, for callers that cache externally
pub fn health_score_now(signals: &HealthSignals) -> HealthScore {
    HealthScore {
        value: health_score(signals),
        last_calculated: Utc::now().to_rfc3339(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(
        messages_per_day: f64,
        average_sentiment: f64,
        conflicts_per_week: f64,
        intimacy_markers: f64,
        responsiveness: f64,
    ) -> HealthSignals {
        HealthSignals {
            messages_per_day,
            average_sentiment,
            conflicts_per_week,
            intimacy_markers,
            responsiveness,
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let total = COMMUNICATION_WEIGHT
            + SENTIMENT_WEIGHT
            + CONFLICT_WEIGHT
            + INTIMACY_WEIGHT
            + RESPONSIVENESS_WEIGHT;
        assert_eq!(total, 1.0);
    }

    #[test]
    fn perfect_signals_score_ten() {
        assert_eq!(health_score(&signals(50.0, 1.0, 0.0, 10.0, 1.0)), 10.0);
    }

    #[test]
    fn worst_signals_score_zero() {
        assert_eq!(health_score(&signals(0.0, -1.0, 10.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn mid_range_signals() {
        // communication 25/50 = 0.5, sentiment (0+1)/2 = 0.5,
        // conflict 1 - 5/10 = 0.5, intimacy 5/10 = 0.5, responsiveness 0.5
        // weighted sum = 0.5, score = 5.0
        assert_eq!(health_score(&signals(25.0, 0.0, 5.0, 5.0, 0.5)), 5.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        // communication 10/50 = 0.2 -> 0.05; sentiment 0.5 -> 0.15;
        // conflict 1 - 1/10 = 0.9 -> 0.18; intimacy 3/10 -> 0.045;
        // responsiveness 0.33 -> 0.033; total 0.458 -> 4.58
        assert_eq!(health_score(&signals(10.0, 0.0, 1.0, 3.0, 0.33)), 4.58);
    }

    #[test]
    fn oversized_inputs_saturate() {
        assert_eq!(health_score(&signals(500.0, 1.0, 0.0, 99.0, 3.0)), 10.0);
    }

    #[test]
    fn negative_inputs_do_not_panic_or_escape_bounds() {
        let score = health_score(&signals(-5.0, -4.0, -2.0, -1.0, -0.5));
        assert!((0.0..=10.0).contains(&score));
        // Negative conflict frequency means no conflicts: that term saturates
        assert_eq!(score, 2.0);
    }

    #[test]
    fn score_always_in_bounds() {
        let cases = [
            signals(0.0, 0.0, 0.0, 0.0, 0.0),
            signals(1e9, 1e9, 1e9, 1e9, 1e9),
            signals(-1e9, -1e9, -1e9, -1e9, -1e9),
            signals(3.5, -0.2, 2.0, 1.0, 0.8),
        ];
        for case in cases {
            let score = health_score(&case);
            assert!((0.0..=10.0).contains(&score), "score {} out of bounds", score);
        }
    }

    #[test]
    fn timestamped_score_carries_same_value() {
        let input = signals(25.0, 0.0, 5.0, 5.0, 0.5);
        let scored = health_score_now(&input);
        assert_eq!(scored.value, 5.0);
        assert!(!scored.last_calculated.is_empty());
    }
}
