use anyhow::Result;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tandem_coach::Coach;
use tandem_schemas::{ApiResponse, CoachRequest};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, Level};
use tracing_subscriber;

#[derive(Clone)]
struct AppState {
    coach: Arc<Coach>,
}

type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Tandem Coach Service v0.1.0");

    let state = AppState {
        coach: Arc::new(Coach::new()),
    };

    // CORS layer for the browser UI
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/v1/advice", post(get_advice))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    // Start HTTP server
    let addr = "127.0.0.1:24812";
    info!("Starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "coach",
        "status": "healthy",
        "version": "0.1.0"
    }))
}

async fn get_advice(
    State(state): State<AppState>,
    Json(request): Json<CoachRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    if request.user_id.0.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err("user_id must not be empty")),
        ));
    }
    if request.question.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err("question must not be empty")),
        ));
    }

    let reply = state.coach.advise(&request).await.map_err(|e| {
        error!("Failed to produce advice: {:#}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::err("coach unavailable")),
        )
    })?;

    Ok(Json(ApiResponse::ok(reply)))
}
