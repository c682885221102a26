use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::IngestionConfig;
use crate::document::DocumentNormalizer;
use crate::models::{FileData, Part};
use crate::services::gemini::{
    GenerateRequest, GenerationConfig, GenerativeBackend, RemoteFile, SafetySetting,
};
use crate::utils::error::ApiError;

const UPLOAD_DISPLAY_NAME: &str = "chat";
const DETECTION_INSTRUCTION: &str = "You are a helpful assistant";
const DETECTION_PROMPT: &str =
    "Names of the people having the conversation back and forth. Provide them in a JSON array.";

/// What a successful ingestion hands back
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionOutcome {
    /// Remote handle as returned by the metadata lookup
    pub remote_file: RemoteFile,
    /// URI reported by the upload call
    pub conversation_file_uri: String,
    /// URI presented to the client
    pub file_uri: String,
    /// Raw JSON text from participant detection
    pub participants_json: String,
}

impl IngestionOutcome {
    pub fn file_data(&self) -> FileData {
        let mime_type = if self.remote_file.mime_type.is_empty() {
            "text/plain".to_string()
        } else {
            self.remote_file.mime_type.clone()
        };

        FileData {
            mime_type,
            file_uri: self.file_uri.clone(),
        }
    }

    /// Detected names as JSON; falls back to the raw text when the model
    /// did not return an array.
    pub fn participants(&self) -> Value {
        let raw = self.participants_json.trim();

        match serde_json::from_str::<Value>(raw) {
            Ok(array @ Value::Array(_)) => array,
            Ok(Value::Object(map)) => map
                .into_iter()
                .map(|(_, v)| v)
                .find(Value::is_array)
                .unwrap_or_else(|| Value::String(raw.to_string())),
            _ => Value::String(raw.to_string()),
        }
    }
}

pub struct IngestionPipeline {
    backend: Arc<dyn GenerativeBackend>,
    normalizer: DocumentNormalizer,
    max_attempts: u32,
    attempt_timeout: Duration,
    detection_model: String,
}

impl IngestionPipeline {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        config: &IngestionConfig,
        detection_model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            normalizer: DocumentNormalizer::new(config.max_pdf_pages),
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.attempt_timeout(),
            detection_model: detection_model.into(),
        }
    }

    /// Normalize, upload (bounded retries), detect participants, clean up.
    /// Blocking; runs on a dispatcher worker.
    pub fn ingest(&self, path: &Path) -> Result<IngestionOutcome, ApiError> {
        let normalized = self.normalizer.normalize(path).map_err(|e| match e {
            ApiError::FileNotFound(_)
            | ApiError::MalformedArchive(_)
            | ApiError::IngestionFailed(_) => e,
            other => ApiError::IngestionFailed(other.to_string()),
        })?;

        let mime_type = mime_guess::from_path(&normalized)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        for attempt in 1..=self.max_attempts {
            let started = Instant::now();
            let uploaded = match self
                .backend
                .upload_file(&normalized, UPLOAD_DISPLAY_NAME, &mime_type)
            {
                Ok(file) => file,
                Err(e) => {
                    error!("Error during upload attempt {}: {}", attempt, e);
                    continue;
                }
            };

            // Slow uploads are discarded even when they succeeded; the next
            // attempt uploads again.
            let elapsed = started.elapsed();
            if elapsed > self.attempt_timeout {
                warn!(
                    "Upload attempt {} took {:?} (limit {:?}), discarding {} and retrying",
                    attempt, elapsed, self.attempt_timeout, uploaded.name
                );
                continue;
            }

            match self.finish_attempt(uploaded) {
                Ok(outcome) => {
                    Self::remove_local(&normalized);
                    info!(
                        "Ingested {} as {} on attempt {}",
                        path.display(),
                        outcome.file_uri,
                        attempt
                    );
                    return Ok(outcome);
                }
                Err(e) => {
                    error!("Error during upload attempt {}: {}", attempt, e);
                }
            }
        }

        Err(ApiError::IngestionFailed(format!(
            "all {} upload attempts failed for {}",
            self.max_attempts,
            path.display()
        )))
    }

    fn finish_attempt(&self, uploaded: RemoteFile) -> Result<IngestionOutcome, ApiError> {
        let saved = self.backend.get_file(&uploaded.name)?;
        let participants_json = self.detect_participants(&saved)?;

        Ok(IngestionOutcome {
            file_uri: saved.uri.clone(),
            conversation_file_uri: uploaded.uri,
            remote_file: saved,
            participants_json,
        })
    }

    /// Ask the model for the transcript's participants as a JSON array
    pub fn detect_participants(&self, file: &RemoteFile) -> Result<String, ApiError> {
        let mime_type = if file.mime_type.is_empty() {
            "text/plain"
        } else {
            file.mime_type.as_str()
        };

        self.backend.generate(GenerateRequest {
            model: self.detection_model.clone(),
            system_instruction: DETECTION_INSTRUCTION.to_string(),
            history: Vec::new(),
            message: vec![
                Part::text(DETECTION_PROMPT),
                Part::file(mime_type, file.uri.clone()),
            ],
            config: GenerationConfig::detection(),
            safety_settings: SafetySetting::block_none(),
        })
    }

    fn remove_local(path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => info!("Deleted local file: {}", path.display()),
            Err(e) => warn!("Could not delete local file {}: {}", path.display(), e),
        }
    }
}
