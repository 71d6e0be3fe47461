use anyhow::Result;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tandem_ingestion::{is_valid_timestamp, Database, SentimentClient, UserContext};
use tandem_schemas::{
    generate_chunk_id, generate_event_id, generate_message_id, ApiResponse, ChunkRole,
    ConversationChunk, EventKind, Message, RelationshipEvent, Sender,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn, Level};
use tracing_subscriber;

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    sentiment: Arc<Option<SentimentClient>>,
}

type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Tandem Ingestion Service v0.1.0");

    // Initialize database
    let db_path = std::env::var("TANDEM_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap();
        format!("{}/.local/share/tandem/tandem.db", home)
    });

    // Create directory if it doesn't exist
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::new(&db_path)?;
    info!("Database initialized at: {}", db_path);

    let sentiment = SentimentClient::from_env_optional();
    if sentiment.is_none() {
        warn!("ANALYSIS_URL not set; sentiment backfill is disabled");
    }

    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        sentiment: Arc::new(sentiment),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/messages", post(ingest_message).get(list_messages))
        .route("/events", post(create_event).get(list_events))
        .route("/chunks", post(ingest_chunk).get(list_chunks))
        .route("/sentiment/backfill", post(backfill_sentiment))
        .route("/stats", get(get_stats))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = "127.0.0.1:24810";
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn storage_error(err: anyhow::Error) -> ErrorResponse {
    error!("Storage error: {:#}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::err("store not available")),
    )
}

fn bad_request(message: impl Into<String>) -> ErrorResponse {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::err(message)))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "ingestion",
        "status": "healthy",
        "version": "0.1.0"
    }))
}

#[derive(Debug, Deserialize)]
struct IngestMessageRequest {
    timestamp: String,
    sender: Sender,
    content: String,
    sentiment_score: Option<f64>,
}

async fn ingest_message(
    State(state): State<AppState>,
    UserContext(user_id): UserContext,
    Json(request): Json<IngestMessageRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    if request.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }
    if !is_valid_timestamp(&request.timestamp) {
        return Err(bad_request(format!(
            "unparseable timestamp '{}'",
            request.timestamp
        )));
    }
    if let Some(score) = request.sentiment_score {
        if !(-1.0..=1.0).contains(&score) {
            return Err(bad_request("sentiment_score must be in [-1, 1]"));
        }
    }

    let message = Message {
        id: generate_message_id(),
        user_id,
        timestamp: request.timestamp,
        sender: request.sender,
        content: request.content,
        sentiment_score: request.sentiment_score,
    };

    let db = state.db.lock().await;
    db.insert_message(&message).map_err(storage_error)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "message_id": message.id.0
    }))))
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    page: Option<usize>,
    per_page: Option<usize>,
}

async fn list_messages(
    State(state): State<AppState>,
    UserContext(user_id): UserContext,
    query: Option<Query<PageQuery>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let params = query.map(|q| q.0).unwrap_or_default();
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(50).clamp(1, 200);

    let db = state.db.lock().await;
    let messages = db
        .message_page(&user_id, page, per_page)
        .map_err(storage_error)?;
    let total = db.count_distinct_messages(&user_id).map_err(storage_error)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "messages": messages,
        "total": total,
        "page": page,
        "per_page": per_page
    }))))
}

#[derive(Debug, Deserialize)]
struct CreateEventRequest {
    kind: EventKind,
    description: String,
    occurred_at: String,
}

async fn create_event(
    State(state): State<AppState>,
    UserContext(user_id): UserContext,
    Json(request): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    if request.description.trim().is_empty() {
        return Err(bad_request("description must not be empty"));
    }
    if !is_valid_timestamp(&request.occurred_at) {
        return Err(bad_request(format!(
            "unparseable timestamp '{}'",
            request.occurred_at
        )));
    }

    let event = RelationshipEvent {
        id: generate_event_id(),
        user_id,
        kind: request.kind,
        description: request.description,
        occurred_at: request.occurred_at,
    };

    let db = state.db.lock().await;
    db.insert_event(&event).map_err(storage_error)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "event_id": event.id.0
    }))))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn list_events(
    State(state): State<AppState>,
    UserContext(user_id): UserContext,
    query: Option<Query<ListQuery>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let params = query.map(|q| q.0).unwrap_or_default();
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let db = state.db.lock().await;
    let events = db.list_events(&user_id, limit).map_err(storage_error)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "events": events
    }))))
}

#[derive(Debug, Deserialize)]
struct ChunkRequest {
    role: ChunkRole,
    content: String,
}

async fn ingest_chunk(
    State(state): State<AppState>,
    UserContext(user_id): UserContext,
    Json(request): Json<ChunkRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    if request.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }

    let chunk = ConversationChunk {
        id: generate_chunk_id(),
        user_id,
        role: request.role,
        content: request.content,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    let db = state.db.lock().await;
    db.insert_chunk(&chunk).map_err(storage_error)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "chunk_id": chunk.id.0
    }))))
}

async fn list_chunks(
    State(state): State<AppState>,
    UserContext(user_id): UserContext,
    query: Option<Query<ListQuery>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let params = query.map(|q| q.0).unwrap_or_default();
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let db = state.db.lock().await;
    let chunks = db.recent_chunks(&user_id, limit).map_err(storage_error)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "chunks": chunks
    }))))
}

#[derive(Debug, Default, Deserialize)]
struct BackfillQuery {
    limit: Option<usize>,
}

async fn backfill_sentiment(
    State(state): State<AppState>,
    UserContext(user_id): UserContext,
    query: Option<Query<BackfillQuery>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let params = query.map(|q| q.0).unwrap_or_default();
    let limit = params.limit.unwrap_or(100).clamp(1, 500);

    let Some(client) = &*state.sentiment else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::err("analysis service not configured")),
        ));
    };

    // Collect pending rows, then release the lock before the network call
    let pending = {
        let db = state.db.lock().await;
        db.unscored_messages(&user_id, limit).map_err(storage_error)?
    };

    if pending.is_empty() {
        return Ok(Json(ApiResponse::ok(serde_json::json!({ "scored": 0 }))));
    }

    let texts: Vec<String> = pending.iter().map(|m| m.content.clone()).collect();
    let scores = client.score(&texts).await.map_err(|e| {
        error!("Sentiment backfill failed upstream: {:#}", e);
        (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::err("analysis service failed")),
        )
    })?;

    let db = state.db.lock().await;
    let mut scored = 0usize;
    for (message, score) in pending.iter().zip(scores) {
        if db.set_sentiment(&message.id, score).map_err(storage_error)? {
            scored += 1;
        }
    }

    info!("Backfilled sentiment for {} messages", scored);
    Ok(Json(ApiResponse::ok(serde_json::json!({ "scored": scored }))))
}

async fn get_stats(
    State(state): State<AppState>,
    UserContext(user_id): UserContext,
) -> Result<impl IntoResponse, ErrorResponse> {
    let db = state.db.lock().await;
    let stats = db.stats(&user_id).map_err(storage_error)?;

    Ok(Json(ApiResponse::ok(stats)))
}
