use axum::{
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::{
    middleware::{make_span_with_request_id, request_id_middleware},
    services::recommendations::RecommendationPipeline,
};

pub mod runs;

/// Shared state of the operator server
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RecommendationPipeline>,
    /// Runs triggered over HTTP are cancelled when the process shuts down
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pipeline: Arc<RecommendationPipeline>, shutdown: CancellationToken) -> Self {
        Self { pipeline, shutdown }
    }
}

/// Creates the operator router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/runs", axum::routing::post(runs::trigger))
        .route("/runs/latest", get(runs::latest))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
