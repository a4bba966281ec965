use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::RunSummary,
    routes::AppState,
};

/// Summary of the most recent finished run
pub async fn latest(State(state): State<AppState>) -> AppResult<Json<RunSummary>> {
    state
        .pipeline
        .latest()
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No recommendation run has finished yet".to_string()))
}

/// Starts a run in the background.
///
/// The run lock is claimed before answering: 202 means this request owns the
/// run, 409 means another run holds it. The outcome shows up under
/// `/runs/latest`.
pub async fn trigger(State(state): State<AppState>) -> AppResult<(StatusCode, Json<Value>)> {
    let run = state.pipeline.spawn_run(state.shutdown.child_token())?;

    tokio::spawn(async move {
        match run.await {
            Ok(summary) => {
                tracing::info!(run_id = %summary.run_id, status = ?summary.status, "Triggered run completed");
            }
            Err(e) => tracing::error!(error = %e, "Triggered run task failed"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}
