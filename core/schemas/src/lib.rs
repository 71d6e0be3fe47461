use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ULID and ID Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Message Schema
// ============================================================================

/// A single imported text message. Immutable once ingested, except for
/// post-hoc sentiment backfill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user_id: UserId,
    pub timestamp: String, // RFC3339
    pub sender: Sender,
    pub content: String,
    /// Sentiment in [-1, 1]; absent until backfilled.
    pub sentiment_score: Option<f64>,
}

/// Two-party conversation: the account owner and their partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "me")]
    Me,
    #[serde(rename = "partner")]
    Partner,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Me => "me",
            Sender::Partner => "partner",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "me" | "self" | "owner" => Some(Sender::Me),
            "partner" | "them" | "other" => Some(Sender::Partner),
            _ => None,
        }
    }
}

// ============================================================================
// Relationship Event Schema
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipEvent {
    pub id: EventId,
    pub user_id: UserId,
    pub kind: EventKind,
    pub description: String,
    pub occurred_at: String, // RFC3339
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "conflict")]
    Conflict,
    #[serde(rename = "milestone")]
    Milestone,
    #[serde(rename = "celebration")]
    Celebration,
    #[serde(rename = "reconciliation")]
    Reconciliation,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Conflict => "conflict",
            EventKind::Milestone => "milestone",
            EventKind::Celebration => "celebration",
            EventKind::Reconciliation => "reconciliation",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "conflict" => Some(EventKind::Conflict),
            "milestone" => Some(EventKind::Milestone),
            "celebration" => Some(EventKind::Celebration),
            "reconciliation" => Some(EventKind::Reconciliation),
            _ => None,
        }
    }
}

// ============================================================================
// Derived Views (never persisted)
// ============================================================================

/// Monthly aggregation of messages, recomputed from raw rows on every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyBucket {
    /// Calendar month key, "YYYY-MM".
    pub period: String,
    pub average_sentiment: f64,
    pub theme: BucketTheme,
    /// Up to three distinct key-event labels, in encounter order.
    pub key_events: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketTheme {
    #[serde(rename = "High Connection")]
    HighConnection,
    #[serde(rename = "Stable Period")]
    StablePeriod,
    #[serde(rename = "Neutral Phase")]
    NeutralPhase,
    #[serde(rename = "Tension Period")]
    TensionPeriod,
    #[serde(rename = "Conflict Phase")]
    ConflictPhase,
}

impl BucketTheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketTheme::HighConnection => "High Connection",
            BucketTheme::StablePeriod => "Stable Period",
            BucketTheme::NeutralPhase => "Neutral Phase",
            BucketTheme::TensionPeriod => "Tension Period",
            BucketTheme::ConflictPhase => "Conflict Phase",
        }
    }
}

/// Raw inputs to the health score. No bounds are enforced here; the
/// calculator clamps each signal during normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSignals {
    /// Communication frequency, messages per day.
    pub messages_per_day: f64,
    /// Average sentiment in [-1, 1].
    pub average_sentiment: f64,
    /// Conflict frequency, events per week.
    pub conflicts_per_week: f64,
    /// Count of intimacy-indicator messages.
    pub intimacy_markers: f64,
    /// Responsiveness ratio in [0, 1].
    pub responsiveness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthScore {
    /// Composite score in [0, 10], rounded to two decimals.
    pub value: f64,
    pub last_calculated: String, // RFC3339
}

// ============================================================================
// Conversation Chunks (coach exchanges)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationChunk {
    pub id: ChunkId,
    pub user_id: UserId,
    pub role: ChunkRole,
    pub content: String,
    pub created_at: String, // RFC3339
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "coach")]
    Coach,
}

impl ChunkRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkRole::User => "user",
            ChunkRole::Coach => "coach",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "user" => Some(ChunkRole::User),
            "coach" => Some(ChunkRole::Coach),
            _ => None,
        }
    }
}

// ============================================================================
// Agent Wire Schema
// ============================================================================

/// Request shape for externally hosted analysis agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub user_id: UserId,
    pub analysis_type: String,
    pub timeframe_days: u32,
    pub focus: Option<String>,
}

/// Fallback health score when an agent omits the field.
pub const DEFAULT_AGENT_HEALTH_SCORE: f64 = 7.5;

/// Fallback summary when an agent omits the field.
pub const DEFAULT_AGENT_SUMMARY: &str =
    "Not enough analyzed history yet; keep checking in.";

/// Insight payload returned by an analysis agent. Agents are loosely typed
/// upstream, so every field is optional here and read through the
/// `*_or_default` accessors rather than ad hoc per-call fallbacks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInsight {
    pub health_score: Option<f64>,
    pub summary: Option<String>,
    pub recommendations: Option<Vec<String>>,
    pub confidence: Option<f64>,
}

impl AgentInsight {
    /// Health score with the documented fallback of 7.5.
    pub fn health_score_or_default(&self) -> f64 {
        self.health_score.unwrap_or(DEFAULT_AGENT_HEALTH_SCORE)
    }

    pub fn summary_or_default(&self) -> &str {
        self.summary.as_deref().unwrap_or(DEFAULT_AGENT_SUMMARY)
    }

    pub fn recommendations_or_empty(&self) -> &[String] {
        self.recommendations.as_deref().unwrap_or(&[])
    }

    /// Confidence with a fallback of 0.0 (unknown).
    pub fn confidence_or_default(&self) -> f64 {
        self.confidence.unwrap_or(0.0)
    }
}

// ============================================================================
// Coach API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachRequest {
    pub user_id: UserId,
    pub question: String,
    pub timeframe_days: Option<u32>,
    pub detail: Option<ReplyDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyDetail {
    #[serde(rename = "brief")]
    Brief,
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "detailed")]
    Detailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachReply {
    pub reply: String,
    pub health_score: f64,
    pub confidence: f64,
    pub generated_at: String, // RFC3339
}

// ============================================================================
// HTTP Envelope
// ============================================================================

/// Standard `{ success, data | error }` payload for every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn generate_message_id() -> MessageId {
    MessageId(format!("msg_{}", ulid::Ulid::new()))
}

pub fn generate_event_id() -> EventId {
    EventId(format!("evt_{}", ulid::Ulid::new()))
}

pub fn generate_chunk_id() -> ChunkId {
    ChunkId(format!("chk_{}", ulid::Ulid::new()))
}
