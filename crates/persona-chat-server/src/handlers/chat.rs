use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::{debug, info};

use crate::models::api::{SendMessageRequest, SendMessageResponse, StopRequest, StopResponse};
use crate::models::LatestExchange;
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Escape markup in user input before it reaches the model or the history
fn escape(input: &str) -> String {
    html_escape::encode_text(input).into_owned()
}

/// Absent and blank ids are both unknown sessions
fn require_session_id(raw: Option<String>) -> Result<String, ApiError> {
    match raw.map(|id| id.trim().to_string()) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ApiError::SessionNotFound(String::new())),
    }
}

/// A persona needs a name to be portrayed
fn require_name(raw: Option<&str>) -> Result<&str, ApiError> {
    match raw {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => Err(ApiError::InvalidRequest("Missing name".to_string())),
    }
}

/// POST /send_message
pub async fn send_message_handler(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|e| ApiError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

    let session_id = require_session_id(request.session_id)?;
    if !state.sessions.contains(&session_id) {
        return Err(ApiError::SessionNotFound(session_id));
    }

    let name = escape(require_name(request.name.as_deref())?);
    let chat = escape(request.chat.as_deref().unwrap_or_default());
    let personality = escape(request.personality.as_deref().unwrap_or_default());

    debug!("Message for session {} as '{}'", session_id, name);

    let engine = state.engine.clone();
    let id = session_id.clone();
    let history = state
        .dispatcher
        .run("conversation", move || {
            engine.send(&chat, &name, &personality, &id)
        })
        .await?;

    Ok(Json(SendMessageResponse {
        latest: LatestExchange::from_history(&history),
        history,
        session_id,
    }))
}

/// POST /stop: drop the session and its files
pub async fn stop_handler(
    State(state): State<AppState>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> Result<Json<StopResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|e| ApiError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

    let session_id = require_session_id(request.session_id)?;
    let engine = state.engine.clone();
    let id = session_id.clone();

    // Waits behind a turn already running for this session
    state
        .dispatcher
        .run("stop", move || engine.close_session(&id))
        .await?;

    info!("Session {} stopped", session_id);
    Ok(Json(StopResponse { status: "success" }))
}
