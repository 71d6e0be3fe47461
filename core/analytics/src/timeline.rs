use std::collections::BTreeMap;
use tandem_schemas::{BucketTheme, Message, MonthlyBucket};
use tracing::debug;

/// Fixed keyword set matched (case-insensitively) against message content to
/// surface key events per month.
pub const KEY_EVENT_TERMS: [&str; 7] = [
    "birthday",
    "anniversary",
    "vacation",
    "work",
    "family",
    "fight",
    "celebration",
];

const MAX_KEY_EVENTS: usize = 3;

/// Group messages into calendar-month buckets and label each with a
/// sentiment theme and up to three key events.
///
/// The bucket key is the first 7 characters of the stored ISO-8601
/// timestamp ("YYYY-MM"); no timezone conversion is applied. Messages with
/// no sentiment score count as 0 toward the mean, so unscored months read
/// as neutral. Buckets come back in key order; callers wanting a different
/// order sort themselves. Empty input yields empty output.
pub fn monthly_buckets(messages: &[Message]) -> Vec<MonthlyBucket> {
    let mut months: BTreeMap<String, Vec<&Message>> = BTreeMap::new();

    for message in messages {
        let Some(period) = message.timestamp.get(0..7) else {
            debug!("Skipping message {} with short timestamp", message.id);
            continue;
        };
        months.entry(period.to_string()).or_default().push(message);
    }

    months
        .into_iter()
        .map(|(period, bucket)| {
            let sum: f64 = bucket
                .iter()
                .map(|m| m.sentiment_score.unwrap_or(0.0))
                .sum();
            let average_sentiment = sum / bucket.len() as f64;

            MonthlyBucket {
                period,
                average_sentiment,
                theme: classify_theme(average_sentiment),
                key_events: extract_key_events(&bucket),
            }
        })
        .collect()
}

/// Theme thresholds are strict: a mean of exactly 0.5 is a Stable Period,
/// not High Connection.
pub fn classify_theme(average_sentiment: f64) -> BucketTheme {
    if average_sentiment > 0.5 {
        BucketTheme::HighConnection
    } else if average_sentiment > 0.2 {
        BucketTheme::StablePeriod
    } else if average_sentiment > -0.2 {
        BucketTheme::NeutralPhase
    } else if average_sentiment > -0.5 {
        BucketTheme::TensionPeriod
    } else {
        BucketTheme::ConflictPhase
    }
}

/// First three distinct keyword hits in encounter order, not ranked by
/// frequency. Encounter order is per message; when one message contains
/// several keywords they are reported in keyword-table order, not by
/// position in the text.
fn extract_key_events(bucket: &[&Message]) -> Vec<String> {
    let mut events: Vec<String> = Vec::new();

    for message in bucket {
        if events.len() == MAX_KEY_EVENTS {
            break;
        }
        let content = message.content.to_lowercase();
        for term in KEY_EVENT_TERMS {
            if content.contains(term) && !events.iter().any(|e| e == term) {
                events.push(term.to_string());
                if events.len() == MAX_KEY_EVENTS {
                    break;
                }
            }
        }
    }

    events
}
