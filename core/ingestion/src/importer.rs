use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tandem_schemas::{generate_message_id, Message, Sender, UserId};
use thiserror::Error;
use tracing::info;

use crate::database::Database;

/// Row-level failures while parsing an exported message history CSV
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("row {row}: unrecognized sender '{raw}' (expected me/partner)")]
    UnknownSender { row: usize, raw: String },
    #[error("row {row}: unparseable timestamp '{raw}'")]
    BadTimestamp { row: usize, raw: String },
    #[error("row {row}: sentiment {value} outside [-1, 1]")]
    SentimentOutOfRange { row: usize, value: f64 },
}

/// Expected CSV columns: timestamp,sender,content[,sentiment]
#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    sender: String,
    content: String,
    #[serde(default)]
    sentiment: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    pub rows: usize,
    pub scored: usize,
}

/// Parse an exported message history CSV into messages for one user.
/// Fails on the first malformed row so a fixed file can simply be re-run.
pub fn parse_csv<R: Read>(reader: R, user_id: &UserId) -> Result<Vec<Message>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut messages = Vec::new();

    for (index, record) in csv_reader.deserialize::<CsvRow>().enumerate() {
        // Row numbers are 1-based and skip the header line
        let row = index + 2;
        let record = record.with_context(|| format!("failed to read CSV row {}", row))?;

        let sender = Sender::parse(&record.sender).ok_or(ImportError::UnknownSender {
            row,
            raw: record.sender.clone(),
        })?;

        if !is_valid_timestamp(&record.timestamp) {
            return Err(ImportError::BadTimestamp {
                row,
                raw: record.timestamp,
            }
            .into());
        }

        if let Some(score) = record.sentiment {
            if !(-1.0..=1.0).contains(&score) {
                return Err(ImportError::SentimentOutOfRange { row, value: score }.into());
            }
        }

        messages.push(Message {
            id: generate_message_id(),
            user_id: user_id.clone(),
            timestamp: record.timestamp,
            sender,
            content: record.content,
            sentiment_score: record.sentiment,
        });
    }

    Ok(messages)
}

/// Import a CSV file and batch-insert its messages in one transaction
pub fn import_csv(db: &Database, path: &Path, user_id: &UserId) -> Result<ImportStats> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let messages = parse_csv(file, user_id)?;
    let scored = messages
        .iter()
        .filter(|m| m.sentiment_score.is_some())
        .count();

    let rows = db.insert_messages(&messages)?;
    info!("Imported {} messages ({} pre-scored) from {}", rows, scored, path.display());

    Ok(ImportStats { rows, scored })
}

/// Exports carry either full RFC3339 timestamps or bare dates
pub fn is_valid_timestamp(raw: &str) -> bool {
    DateTime::parse_from_rfc3339(raw).is_ok()
        || NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId("usr_test".to_string())
    }

    #[test]
    fn parses_well_formed_rows() {
        let csv = "timestamp,sender,content,sentiment\n\
                   2025-01-05T09:00:00Z,me,good morning,0.4\n\
                   2025-01-05,partner,\"happy birthday, love\",\n";

        let messages = parse_csv(csv.as_bytes(), &user()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::Me);
        assert_eq!(messages[0].sentiment_score, Some(0.4));
        assert_eq!(messages[1].sender, Sender::Partner);
        assert_eq!(messages[1].content, "happy birthday, love");
        assert_eq!(messages[1].sentiment_score, None);
        assert!(messages[0].id.0.starts_with("msg_"));
    }

    #[test]
    fn rejects_unknown_sender() {
        let csv = "timestamp,sender,content,sentiment\n\
                   2025-01-05T09:00:00Z,group,hello,\n";

        let err = parse_csv(csv.as_bytes(), &user()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
        assert!(err.to_string().contains("group"));
    }

    #[test]
    fn rejects_bad_timestamp() {
        let csv = "timestamp,sender,content,sentiment\n\
                   Jan 5th,me,hello,\n";

        let err = parse_csv(csv.as_bytes(), &user()).unwrap_err();
        assert!(err.to_string().contains("unparseable timestamp"));
    }

    #[test]
    fn rejects_out_of_range_sentiment() {
        let csv = "timestamp,sender,content,sentiment\n\
                   2025-01-05T09:00:00Z,me,hello,1.5\n";

        let err = parse_csv(csv.as_bytes(), &user()).unwrap_err();
        assert!(err.to_string().contains("outside [-1, 1]"));
    }

    #[test]
    fn empty_file_yields_no_messages() {
        let csv = "timestamp,sender,content,sentiment\n";
        let messages = parse_csv(csv.as_bytes(), &user()).unwrap();
        assert!(messages.is_empty());
    }
}
