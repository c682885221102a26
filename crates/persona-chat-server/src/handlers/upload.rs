use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::models::api::UploadResponse;
use crate::state::AppState;
use crate::utils::error::ApiError;

/// POST /upload: store the artifact, ingest it, open a session
pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::InvalidRequest(format!("Expected multipart form: {}", e)))?;

    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("Failed to read field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to read file: {}", e)))?;
        upload = Some((filename, bytes.to_vec()));
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::InvalidRequest("No file part".to_string()))?;
    let filename = sanitize_filename(&filename)
        .ok_or_else(|| ApiError::InvalidRequest("No selected file".to_string()))?;

    let extension = Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !state.settings.upload.is_allowed(extension) {
        return Err(ApiError::InvalidRequest(format!(
            "File type not allowed: {}",
            filename
        )));
    }

    let path = stored_path(&state.settings.storage.upload_dir, &filename);
    tokio::fs::write(&path, &bytes).await?;
    info!("Stored upload {} ({} bytes) at {}", filename, bytes.len(), path.display());

    ingest_and_open(&state, path).await.map(Json)
}

/// POST /run_demo: same as an upload of the bundled sample transcript
pub async fn run_demo_handler(
    State(state): State<AppState>,
) -> Result<Json<UploadResponse>, ApiError> {
    let demo = state.settings.storage.demo_path.clone();
    let filename = demo
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("demo.pdf")
        .to_string();
    let path = stored_path(&state.settings.storage.upload_dir, &filename);

    info!("Running demo with {}", demo.display());

    // Ingestion consumes its input, so work on a copy
    let target = path.clone();
    state
        .dispatcher
        .run("copy demo", move || {
            if !demo.exists() {
                return Err(ApiError::FileNotFound(demo));
            }
            std::fs::copy(&demo, &target)?;
            Ok(())
        })
        .await?;

    ingest_and_open(&state, path).await.map(Json)
}

async fn ingest_and_open(state: &AppState, path: PathBuf) -> Result<UploadResponse, ApiError> {
    let ingestion = state.ingestion.clone();
    let engine = state.engine.clone();

    state
        .dispatcher
        .run("ingest", move || {
            let outcome = ingestion.ingest(&path)?;
            let session_id = engine.open_session(&path, &outcome)?;

            Ok(UploadResponse {
                people: outcome.participants(),
                file_data: outcome.file_data(),
                session_id,
            })
        })
        .await
}

/// Final path component only; `None` when nothing usable is left
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();

    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

fn stored_path(upload_dir: &Path, filename: &str) -> PathBuf {
    upload_dir.join(format!("{}_{}", Uuid::new_v4().simple(), filename))
}
