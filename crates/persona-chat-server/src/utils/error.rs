use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid session")]
    SessionNotFound(String),

    #[error("Duplicate session id: {0}")]
    DuplicateSession(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    #[error("Ingestion failed: {0}")]
    IngestionFailed(String),

    #[error("Failed to load history from {location}: {reason}")]
    HistoryLoadFailure { location: PathBuf, reason: String },

    #[error("Conversation failed: {0}")]
    ConversationFailed(String),

    #[error("No message")]
    EmptyUtterance,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound(_)
            | ApiError::EmptyUtterance
            | ApiError::FileNotFound(_)
            | ApiError::MalformedArchive(_)
            | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateSession(_)
            | ApiError::IngestionFailed(_)
            | ApiError::HistoryLoadFailure { .. }
            | ApiError::ConversationFailed(_)
            | ApiError::Upstream(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text sent to the client in the `error` field
    pub fn client_message(&self) -> String {
        match self {
            ApiError::IngestionFailed(_) => "Error during upload and detection".to_string(),
            ApiError::ConversationFailed(_) => "Error during conversation".to_string(),
            ApiError::DuplicateSession(_)
            | ApiError::HistoryLoadFailure { .. }
            | ApiError::Upstream(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_client_error() {
            tracing::warn!("Request rejected: {}", self);
        } else {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.client_message(),
        });

        (status, body).into_response()
    }
}
