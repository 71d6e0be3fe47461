use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tandem_schemas::{
    EventId, EventKind, Message, MessageId, RelationshipEvent, Sender, UserId,
};
use tracing::info;

/// Read-only view over the ingestion store. The ingestion service owns the
/// schema; this side only queries it.
pub struct ReadStore {
    conn: Connection,
}

impl ReadStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!("Opened ingestion store");
        Ok(Self { conn })
    }

    /// All of one user's messages, oldest first
    pub fn all_messages(&self, user_id: &UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, ts, sender, content, sentiment_score
             FROM messages
             WHERE user_id = ?1
             ORDER BY ts ASC",
        )?;

        let messages = stmt
            .query_map(params![user_id.0], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Messages at or after the cutoff timestamp, oldest first. Timestamps
    /// are stored as ISO-8601 strings, so the comparison is lexicographic.
    pub fn messages_since(&self, user_id: &UserId, cutoff: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, ts, sender, content, sentiment_score
             FROM messages
             WHERE user_id = ?1 AND ts >= ?2
             ORDER BY ts ASC",
        )?;

        let messages = stmt
            .query_map(params![user_id.0, cutoff], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Relationship events at or after the cutoff timestamp
    pub fn events_since(
        &self,
        user_id: &UserId,
        cutoff: &str,
    ) -> Result<Vec<RelationshipEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, kind, description, occurred_at
             FROM relationship_events
             WHERE user_id = ?1 AND occurred_at >= ?2
             ORDER BY occurred_at ASC",
        )?;

        let events = stmt
            .query_map(params![user_id.0, cutoff], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let sender_raw: String = row.get(3)?;
    let sender = Sender::parse(&sender_raw).ok_or_else(|| enum_error(3, &sender_raw))?;

    Ok(Message {
        id: MessageId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        timestamp: row.get(2)?,
        sender,
        content: row.get(4)?,
        sentiment_score: row.get(5)?,
    })
}

fn row_to_event(row: &Row) -> rusqlite::Result<RelationshipEvent> {
    let kind_raw: String = row.get(2)?;
    let kind = EventKind::parse(&kind_raw).ok_or_else(|| enum_error(2, &kind_raw))?;

    Ok(RelationshipEvent {
        id: EventId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        kind,
        description: row.get(3)?,
        occurred_at: row.get(4)?,
    })
}

fn enum_error(column: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        format!("unrecognized stored value: {}", raw).into(),
    )
}
