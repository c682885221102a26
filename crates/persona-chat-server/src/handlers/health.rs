use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    sessions: usize,
    queued_jobs: usize,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sessions: state.sessions.len(),
            queued_jobs: state.dispatcher.queued(),
        }),
    )
}

/// Ready once both storage directories are reachable
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    let storage = &state.settings.storage;

    if !storage.upload_dir.is_dir() || !state.history.root().is_dir() {
        warn!("Storage directories missing, not ready");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    StatusCode::OK
}
