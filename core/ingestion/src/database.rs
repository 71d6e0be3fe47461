use anyhow::Result;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::Path;
use tandem_schemas::{
    ChunkId, ChunkRole, ConversationChunk, EventId, EventKind, Message, MessageId,
    RelationshipEvent, Sender, UserId,
};
use tracing::{debug, info};

/// Per-user ingestion counters returned by the stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub message_count: usize,
    pub distinct_message_count: usize,
    pub scored_message_count: usize,
    pub event_count: usize,
    pub chunk_count: usize,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Initialize database with schema
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        let db = Self { conn };
        db.init_schema()?;

        info!("Database initialized");
        Ok(db)
    }

    /// Check if a column exists in a table
    fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let query = format!("PRAGMA table_info({})", table);
        let mut stmt = self.conn.prepare(&query)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns.contains(&column.to_string()))
    }

    /// Create all tables and indexes. Every step is idempotent so the schema
    /// can be re-applied on startup against an existing store.
    fn init_schema(&self) -> Result<()> {
        // Messages table (append-only imported history)
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                ts TEXT NOT NULL,
                sender TEXT NOT NULL,
                content TEXT NOT NULL,
                imported_at TEXT NOT NULL
            )",
            [],
        )?;

        // Relationship events (conflicts, milestones, ...)
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS relationship_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                description TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Conversation chunks captured from the coach service
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS conversation_chunks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Sentiment backfill column arrived after the first deployments.
        // SQLite has no IF NOT EXISTS for ALTER, so we probe the column first.
        let has_sentiment = self.has_column("messages", "sentiment_score")?;
        if !has_sentiment {
            self.conn.execute(
                "ALTER TABLE messages ADD COLUMN sentiment_score REAL",
                [],
            )?;
        }

        // Indexes for performance
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_user_ts ON messages(user_id, ts DESC)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_user ON relationship_events(user_id, occurred_at DESC)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chunks_user ON conversation_chunks(user_id, created_at DESC)",
            [],
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Insert a message into the database
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn.execute(
            "INSERT INTO messages (id, user_id, ts, sender, content, sentiment_score, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.0,
                message.user_id.0,
                message.timestamp,
                message.sender.as_str(),
                message.content,
                message.sentiment_score,
                Utc::now().to_rfc3339(),
            ],
        )?;

        debug!("Inserted message: {}", message.id);
        Ok(())
    }

    /// Insert a batch of messages in a single transaction. Returns the
    /// number of rows inserted.
    pub fn insert_messages(&self, messages: &[Message]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let imported_at = Utc::now().to_rfc3339();

        for message in messages {
            tx.execute(
                "INSERT INTO messages (id, user_id, ts, sender, content, sentiment_score, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message.id.0,
                    message.user_id.0,
                    message.timestamp,
                    message.sender.as_str(),
                    message.content,
                    message.sentiment_score,
                    imported_at,
                ],
            )?;
        }

        tx.commit()?;
        info!("Inserted {} messages", messages.len());
        Ok(messages.len())
    }

    /// One page of the deduplicated message view, newest first. Rows sharing
    /// a timestamp and trimmed content collapse to their first-ranked copy.
    /// `page` is 1-based.
    pub fn message_page(
        &self,
        user_id: &UserId,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<Message>> {
        let offset = page.saturating_sub(1) * per_page;
        let mut stmt = self.conn.prepare(
            "WITH ranked AS (
                 SELECT id, user_id, ts, sender, content, sentiment_score,
                        ROW_NUMBER() OVER (
                            PARTITION BY ts, TRIM(content)
                            ORDER BY id
                        ) AS rn
                 FROM messages
                 WHERE user_id = ?1
             )
             SELECT id, user_id, ts, sender, content, sentiment_score
             FROM ranked
             WHERE rn = 1
             ORDER BY ts DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let messages = stmt
            .query_map(params![user_id.0, per_page, offset], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Deduplicated cardinality for the same view as `message_page`. The
    /// filter set must stay identical to the page query so pagination and
    /// totals agree.
    pub fn count_distinct_messages(&self, user_id: &UserId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "WITH ranked AS (
                 SELECT ROW_NUMBER() OVER (
                            PARTITION BY ts, TRIM(content)
                            ORDER BY id
                        ) AS rn
                 FROM messages
                 WHERE user_id = ?1
             )
             SELECT COUNT(*) FROM ranked WHERE rn = 1",
            params![user_id.0],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    /// Raw (non-deduplicated) message count
    pub fn count_messages(&self, user_id: &UserId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE user_id = ?1",
            params![user_id.0],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    /// Messages still waiting for sentiment backfill, oldest first
    pub fn unscored_messages(&self, user_id: &UserId, limit: usize) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, ts, sender, content, sentiment_score
             FROM messages
             WHERE user_id = ?1 AND sentiment_score IS NULL
             ORDER BY ts ASC
             LIMIT ?2",
        )?;

        let messages = stmt
            .query_map(params![user_id.0, limit], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Backfill the sentiment score for one message. Returns false when the
    /// id is unknown.
    pub fn set_sentiment(&self, message_id: &MessageId, score: f64) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE messages SET sentiment_score = ?1 WHERE id = ?2",
            params![score, message_id.0],
        )?;

        debug!("Backfilled sentiment for {}: {}", message_id, score);
        Ok(updated > 0)
    }

    /// Insert a relationship event
    pub fn insert_event(&self, event: &RelationshipEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO relationship_events (id, user_id, kind, description, occurred_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id.0,
                event.user_id.0,
                event.kind.as_str(),
                event.description,
                event.occurred_at,
                Utc::now().to_rfc3339(),
            ],
        )?;

        debug!("Inserted event: {} (kind: {:?})", event.id, event.kind);
        Ok(())
    }

    /// Recent relationship events, newest first
    pub fn list_events(&self, user_id: &UserId, limit: usize) -> Result<Vec<RelationshipEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, kind, description, occurred_at
             FROM relationship_events
             WHERE user_id = ?1
             ORDER BY occurred_at DESC
             LIMIT ?2",
        )?;

        let events = stmt
            .query_map(params![user_id.0, limit], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Insert a conversation chunk from the coach service
    pub fn insert_chunk(&self, chunk: &ConversationChunk) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conversation_chunks (id, user_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                chunk.id.0,
                chunk.user_id.0,
                chunk.role.as_str(),
                chunk.content,
                chunk.created_at,
            ],
        )?;

        debug!("Inserted chunk: {}", chunk.id);
        Ok(())
    }

    /// Recent coach exchanges for one user, newest first
    pub fn recent_chunks(&self, user_id: &UserId, limit: usize) -> Result<Vec<ConversationChunk>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, role, content, created_at
             FROM conversation_chunks
             WHERE user_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;

        let chunks = stmt
            .query_map(params![user_id.0, limit], row_to_chunk)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(chunks)
    }

    /// Ingestion counters for one user
    pub fn stats(&self, user_id: &UserId) -> Result<StoreStats> {
        let message_count = self.count_messages(user_id)?;
        let distinct_message_count = self.count_distinct_messages(user_id)?;

        let scored_message_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE user_id = ?1 AND sentiment_score IS NOT NULL",
            params![user_id.0],
            |row| row.get(0),
        )?;

        let event_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM relationship_events WHERE user_id = ?1",
            params![user_id.0],
            |row| row.get(0),
        )?;

        let chunk_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conversation_chunks WHERE user_id = ?1",
            params![user_id.0],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            message_count,
            distinct_message_count,
            scored_message_count: scored_message_count as usize,
            event_count: event_count as usize,
            chunk_count: chunk_count as usize,
        })
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

fn row_to_chunk(row: &Row) -> rusqlite::Result<ConversationChunk> {
    let role_raw: String = row.get(2)?;
    let role = ChunkRole::parse(&role_raw).ok_or_else(|| enum_error(2, &role_raw))?;

    Ok(ConversationChunk {
        id: ChunkId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        role,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn enum_error(column: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        format!("unrecognized stored value: {}", raw).into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_schemas::{generate_chunk_id, generate_event_id, generate_message_id};
    use tempfile::TempDir;

    fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("tandem.db")).unwrap();
        (db, dir)
    }

    fn message(user: &str, ts: &str, content: &str, score: Option<f64>) -> Message {
        Message {
            id: generate_message_id(),
            user_id: UserId(user.to_string()),
            timestamp: ts.to_string(),
            sender: Sender::Partner,
            content: content.to_string(),
            sentiment_score: score,
        }
    }

    #[test]
    fn schema_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tandem.db");

        let first = Database::new(&path).unwrap();
        first
            .insert_message(&message("usr_a", "2025-01-05T09:00:00Z", "hello", None))
            .unwrap();
        drop(first);

        // Reopening re-runs every schema step against the existing store
        let second = Database::new(&path).unwrap();
        assert_eq!(
            second.count_messages(&UserId("usr_a".to_string())).unwrap(),
            1
        );
    }

    #[test]
    fn dedup_page_collapses_identical_rows() {
        let (db, _dir) = test_db();
        let user = UserId("usr_a".to_string());

        // Same timestamp, same content modulo trailing whitespace
        db.insert_message(&message("usr_a", "2025-01-05T09:00:00Z", "see you soon", None))
            .unwrap();
        db.insert_message(&message("usr_a", "2025-01-05T09:00:00Z", "see you soon  ", None))
            .unwrap();
        db.insert_message(&message("usr_a", "2025-01-06T10:00:00Z", "good morning", None))
            .unwrap();

        // Page size 1 returns exactly one of the duplicate pair
        let page = db.message_page(&user, 2, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].content.trim(), "see you soon");

        // Count reflects deduplicated cardinality, not raw rows
        assert_eq!(db.count_distinct_messages(&user).unwrap(), 2);
        assert_eq!(db.count_messages(&user).unwrap(), 3);
    }

    #[test]
    fn pagination_and_count_share_filters() {
        let (db, _dir) = test_db();
        let user = UserId("usr_a".to_string());

        db.insert_message(&message("usr_a", "2025-01-05T09:00:00Z", "ours", None))
            .unwrap();
        db.insert_message(&message("usr_b", "2025-01-05T09:00:00Z", "theirs", None))
            .unwrap();

        assert_eq!(db.count_distinct_messages(&user).unwrap(), 1);
        let page = db.message_page(&user, 1, 10).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].content, "ours");
    }

    #[test]
    fn sentiment_backfill_updates_unscored_rows() {
        let (db, _dir) = test_db();
        let user = UserId("usr_a".to_string());

        let unscored = message("usr_a", "2025-01-05T09:00:00Z", "long day", None);
        db.insert_message(&unscored).unwrap();
        db.insert_message(&message("usr_a", "2025-01-06T09:00:00Z", "love you", Some(0.9)))
            .unwrap();

        let pending = db.unscored_messages(&user, 50).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, unscored.id);

        assert!(db.set_sentiment(&unscored.id, -0.4).unwrap());
        assert!(db.unscored_messages(&user, 50).unwrap().is_empty());

        let page = db.message_page(&user, 1, 10).unwrap();
        let refreshed = page.iter().find(|m| m.id == unscored.id).unwrap();
        assert_eq!(refreshed.sentiment_score, Some(-0.4));

        // Unknown ids report no update
        assert!(!db.set_sentiment(&generate_message_id(), 0.0).unwrap());
    }

    #[test]
    fn events_round_trip() {
        let (db, _dir) = test_db();
        let user = UserId("usr_a".to_string());

        db.insert_event(&RelationshipEvent {
            id: generate_event_id(),
            user_id: user.clone(),
            kind: EventKind::Conflict,
            description: "argument about plans".to_string(),
            occurred_at: "2025-01-10T20:00:00Z".to_string(),
        })
        .unwrap();
        db.insert_event(&RelationshipEvent {
            id: generate_event_id(),
            user_id: user.clone(),
            kind: EventKind::Milestone,
            description: "two year anniversary".to_string(),
            occurred_at: "2025-01-14T18:00:00Z".to_string(),
        })
        .unwrap();

        let events = db.list_events(&user, 10).unwrap();
        assert_eq!(events.len(), 2);
        // Newest first
        assert_eq!(events[0].kind, EventKind::Milestone);
        assert_eq!(events[1].kind, EventKind::Conflict);
    }

    #[test]
    fn chunks_read_back_with_typed_roles() {
        let (db, _dir) = test_db();
        let user = UserId("usr_a".to_string());

        db.insert_chunk(&ConversationChunk {
            id: generate_chunk_id(),
            user_id: user.clone(),
            role: ChunkRole::User,
            content: "how are we doing?".to_string(),
            created_at: "2025-01-05T10:00:00Z".to_string(),
        })
        .unwrap();
        db.insert_chunk(&ConversationChunk {
            id: generate_chunk_id(),
            user_id: user.clone(),
            role: ChunkRole::Coach,
            content: "Steady month overall.".to_string(),
            created_at: "2025-01-05T10:00:05Z".to_string(),
        })
        .unwrap();
        db.insert_chunk(&ConversationChunk {
            id: generate_chunk_id(),
            user_id: UserId("usr_b".to_string()),
            role: ChunkRole::User,
            content: "not mine".to_string(),
            created_at: "2025-01-05T11:00:00Z".to_string(),
        })
        .unwrap();

        let chunks = db.recent_chunks(&user, 10).unwrap();
        assert_eq!(chunks.len(), 2);
        // Newest first, stored role strings mapped back to the enum
        assert_eq!(chunks[0].role, ChunkRole::Coach);
        assert_eq!(chunks[1].role, ChunkRole::User);
        assert_eq!(chunks[1].content, "how are we doing?");
    }

    #[test]
    fn stats_count_per_user() {
        let (db, _dir) = test_db();
        let user = UserId("usr_a".to_string());

        db.insert_messages(&[
            message("usr_a", "2025-01-05T09:00:00Z", "hi", Some(0.2)),
            message("usr_a", "2025-01-05T09:01:00Z", "hi back", None),
        ])
        .unwrap();
        db.insert_chunk(&ConversationChunk {
            id: generate_chunk_id(),
            user_id: user.clone(),
            role: ChunkRole::User,
            content: "how are we doing?".to_string(),
            created_at: "2025-01-05T10:00:00Z".to_string(),
        })
        .unwrap();

        let stats = db.stats(&user).unwrap();
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.distinct_message_count, 2);
        assert_eq!(stats.scored_message_count, 1);
        assert_eq!(stats.event_count, 0);
        assert_eq!(stats.chunk_count, 1);
    }
}
