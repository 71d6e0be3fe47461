use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tandem_analytics::{derive_signals, health_score_now, monthly_buckets, ReadStore};
use tandem_schemas::{ApiResponse, UserId};
use tokio::sync::Mutex;
use tracing::{error, info, Level};
use tracing_subscriber;

#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<ReadStore>>,
}

type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Tandem Analytics Service v0.1.0");

    let db_path = std::env::var("TANDEM_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap();
        format!("{}/.local/share/tandem/tandem.db", home)
    });

    let store = ReadStore::open(&db_path)?;
    info!("Reading store at: {}", db_path);

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics/health-score", get(get_health_score))
        .route("/metrics/timeline", get(get_timeline))
        .route("/metrics/summary", get(get_summary))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = "127.0.0.1:24811";
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

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "analytics",
        "status": "healthy",
        "version": "0.1.0"
    }))
}

#[derive(Debug, Default, Deserialize)]
struct MetricsQuery {
    user_id: Option<String>,
    window_days: Option<i64>,
}

/// Identity is explicit request context here: metrics are user-scoped and
/// there is no default account to fall back to.
fn require_user(params: &MetricsQuery) -> Result<UserId, ErrorResponse> {
    params
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| UserId(value.to_string()))
        .ok_or((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err("missing required user_id parameter")),
        ))
}

fn window_cutoff(window_days: i64) -> String {
    (Utc::now() - Duration::days(window_days))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

async fn get_health_score(
    State(state): State<AppState>,
    query: Option<Query<MetricsQuery>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let params = query.map(|q| q.0).unwrap_or_default();
    let user_id = require_user(&params)?;
    let window_days = params.window_days.unwrap_or(30).clamp(1, 365);
    let cutoff = window_cutoff(window_days);

    let store = state.store.lock().await;
    let messages = store
        .messages_since(&user_id, &cutoff)
        .map_err(storage_error)?;
    let events = store
        .events_since(&user_id, &cutoff)
        .map_err(storage_error)?;

    let signals = derive_signals(&messages, &events, window_days as f64);
    let score = health_score_now(&signals);

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "score": score,
        "signals": signals,
        "window_days": window_days
    }))))
}

async fn get_timeline(
    State(state): State<AppState>,
    query: Option<Query<MetricsQuery>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let params = query.map(|q| q.0).unwrap_or_default();
    let user_id = require_user(&params)?;

    let store = state.store.lock().await;
    let messages = store.all_messages(&user_id).map_err(storage_error)?;
    let timeline = monthly_buckets(&messages);
    let months = timeline.len();

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "timeline": timeline,
        "months": months
    }))))
}

async fn get_summary(
    State(state): State<AppState>,
    query: Option<Query<MetricsQuery>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let params = query.map(|q| q.0).unwrap_or_default();
    let user_id = require_user(&params)?;
    let window_days = params.window_days.unwrap_or(30).clamp(1, 365);
    let cutoff = window_cutoff(window_days);

    let store = state.store.lock().await;
    let recent = store
        .messages_since(&user_id, &cutoff)
        .map_err(storage_error)?;
    let events = store
        .events_since(&user_id, &cutoff)
        .map_err(storage_error)?;
    let all = store.all_messages(&user_id).map_err(storage_error)?;

    let signals = derive_signals(&recent, &events, window_days as f64);
    let score = health_score_now(&signals);
    let timeline = monthly_buckets(&all);

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "score": score,
        "signals": signals,
        "timeline": timeline,
        "message_count": all.len(),
        "window_days": window_days
    }))))
}
