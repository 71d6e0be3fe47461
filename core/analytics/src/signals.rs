use chrono::{DateTime, NaiveDate, Utc};
use tandem_schemas::{EventKind, HealthSignals, Message, RelationshipEvent};

/// Substrings that mark a message as an intimacy indicator
pub const INTIMACY_TERMS: [&str; 6] = [
    "love",
    "miss you",
    "appreciate",
    "grateful",
    "proud of",
    "date night",
];

/// A reply across senders within this many seconds counts as responsive
const RESPONSIVE_GAP_SECS: i64 = 3600;

/// Derive the five raw health signals from one user's rows over a window.
///
/// The sentiment signal averages scored messages only; unscored rows are
/// ignored here (the missing-as-zero rule applies to the monthly bucketer,
/// not this path). A window with no scored messages reports 0.0 sentiment,
/// and one with no cross-sender exchanges reports 0.0 responsiveness.
pub fn derive_signals(
    messages: &[Message],
    events: &[RelationshipEvent],
    window_days: f64,
) -> HealthSignals {
    let window_days = window_days.max(1.0);

    let messages_per_day = messages.len() as f64 / window_days;

    let scored: Vec<f64> = messages.iter().filter_map(|m| m.sentiment_score).collect();
    let average_sentiment = if scored.is_empty() {
        0.0
    } else {
        scored.iter().sum::<f64>() / scored.len() as f64
    };

    let conflicts = events
        .iter()
        .filter(|e| e.kind == EventKind::Conflict)
        .count();
    let conflicts_per_week = conflicts as f64 / (window_days / 7.0);

    let intimacy_markers = messages
        .iter()
        .filter(|m| {
            let content = m.content.to_lowercase();
            INTIMACY_TERMS.iter().any(|term| content.contains(term))
        })
        .count() as f64;

    HealthSignals {
        messages_per_day,
        average_sentiment,
        conflicts_per_week,
        intimacy_markers,
        responsiveness: responsiveness_ratio(messages),
    }
}

/// Fraction of sender changes answered within an hour. Messages that fail
/// to parse a timestamp are excluded from the pairing.
fn responsiveness_ratio(messages: &[Message]) -> f64 {
    let mut timed: Vec<(DateTime<Utc>, &Message)> = messages
        .iter()
        .filter_map(|m| parse_timestamp(&m.timestamp).map(|ts| (ts, m)))
        .collect();
    timed.sort_by_key(|(ts, _)| *ts);

    let mut exchanges = 0usize;
    let mut responsive = 0usize;

    for pair in timed.windows(2) {
        let (earlier_ts, earlier) = &pair[0];
        let (later_ts, later) = &pair[1];
        if earlier.sender == later.sender {
            continue;
        }
        exchanges += 1;
        if (*later_ts - *earlier_ts).num_seconds() <= RESPONSIVE_GAP_SECS {
            responsive += 1;
        }
    }

    if exchanges == 0 {
        0.0
    } else {
        responsive as f64 / exchanges as f64
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Date-only imports land at midnight UTC
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_schemas::{generate_event_id, generate_message_id, Sender, UserId};

    fn message(timestamp: &str, sender: Sender, content: &str, score: Option<f64>) -> Message {
        Message {
            id: generate_message_id(),
            user_id: UserId("usr_test".to_string()),
            timestamp: timestamp.to_string(),
            sender,
            content: content.to_string(),
            sentiment_score: score,
        }
    }

    fn conflict(occurred_at: &str) -> RelationshipEvent {
        RelationshipEvent {
            id: generate_event_id(),
            user_id: UserId("usr_test".to_string()),
            kind: EventKind::Conflict,
            description: "argument".to_string(),
            occurred_at: occurred_at.to_string(),
        }
    }

    #[test]
    fn empty_window_yields_zeroed_signals() {
        let signals = derive_signals(&[], &[], 30.0);
        assert_eq!(signals.messages_per_day, 0.0);
        assert_eq!(signals.average_sentiment, 0.0);
        assert_eq!(signals.conflicts_per_week, 0.0);
        assert_eq!(signals.intimacy_markers, 0.0);
        assert_eq!(signals.responsiveness, 0.0);
    }

    #[test]
    fn sentiment_averages_scored_rows_only() {
        let messages = vec![
            message("2025-01-01T09:00:00Z", Sender::Me, "a", Some(0.8)),
            message("2025-01-02T09:00:00Z", Sender::Me, "b", None),
            message("2025-01-03T09:00:00Z", Sender::Me, "c", Some(0.4)),
        ];

        let signals = derive_signals(&messages, &[], 30.0);
        assert!((signals.average_sentiment - 0.6).abs() < 1e-9);
        assert!((signals.messages_per_day - 0.1).abs() < 1e-9);
    }

    #[test]
    fn conflicts_scale_to_weekly_rate() {
        let events = vec![
            conflict("2025-01-03T20:00:00Z"),
            conflict("2025-01-10T20:00:00Z"),
        ];

        let signals = derive_signals(&[], &events, 14.0);
        assert!((signals.conflicts_per_week - 1.0).abs() < 1e-9);
    }

    #[test]
    fn intimacy_markers_count_matching_messages() {
        let messages = vec![
            message("2025-01-01T09:00:00Z", Sender::Me, "Love you lots", None),
            message("2025-01-02T09:00:00Z", Sender::Partner, "miss you already", None),
            message("2025-01-03T09:00:00Z", Sender::Me, "see you at six", None),
        ];

        let signals = derive_signals(&messages, &[], 30.0);
        assert_eq!(signals.intimacy_markers, 2.0);
    }

    #[test]
    fn responsiveness_counts_fast_cross_sender_replies() {
        let messages = vec![
            message("2025-01-01T09:00:00Z", Sender::Me, "morning", None),
            // Reply after 10 minutes: responsive
            message("2025-01-01T09:10:00Z", Sender::Partner, "morning!", None),
            // Reply after 5 hours: not responsive
            message("2025-01-01T14:10:00Z", Sender::Me, "busy day?", None),
        ];

        let signals = derive_signals(&messages, &[], 7.0);
        assert!((signals.responsiveness - 0.5).abs() < 1e-9);
    }

    #[test]
    fn same_sender_runs_are_not_exchanges() {
        let messages = vec![
            message("2025-01-01T09:00:00Z", Sender::Me, "one", None),
            message("2025-01-01T09:01:00Z", Sender::Me, "two", None),
            message("2025-01-01T09:02:00Z", Sender::Me, "three", None),
        ];

        let signals = derive_signals(&messages, &[], 7.0);
        assert_eq!(signals.responsiveness, 0.0);
    }

    #[test]
    fn window_is_floored_at_one_day() {
        let messages = vec![message("2025-01-01", Sender::Me, "hi", None)];
        let signals = derive_signals(&messages, &[], 0.0);
        assert_eq!(signals.messages_per_day, 1.0);
    }
}
