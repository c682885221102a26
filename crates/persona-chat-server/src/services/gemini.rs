use crate::config::GeminiConfig;
use crate::models::{ConversationTurn, History, Part};
use crate::utils::error::ApiError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// File held by the analysis service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Service-side handle, e.g. `files/abc123`
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

impl SafetySetting {
    /// Every harm category unfiltered
    pub fn block_none() -> Vec<SafetySetting> {
        HARM_CATEGORIES
            .into_iter()
            .map(|category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl GenerationConfig {
    /// Participant detection: keep creative drift low, ask for JSON
    pub fn detection() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.95,
            top_k: Some(64),
            max_output_tokens: 8192,
            response_mime_type: Some("application/json".to_string()),
        }
    }

    /// Persona chat: expressive sampling
    pub fn conversation() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: None,
            max_output_tokens: 8192,
            response_mime_type: None,
        }
    }
}

/// One `generateContent` call: prior turns plus the new user parts
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: String,
    pub history: History,
    pub message: Vec<Part>,
    pub config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

/// External document-analysis / persona-chat capability.
/// Calls block; run them on dispatcher workers only.
#[cfg_attr(test, mockall::automock)]
pub trait GenerativeBackend: Send + Sync {
    fn upload_file(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, ApiError>;

    fn get_file(&self, name: &str) -> Result<RemoteFile, ApiError>;

    /// Returns the model's reply text
    fn generate(&self, request: GenerateRequest) -> Result<String, ApiError>;
}

// ===== Wire types =====

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    system_instruction: InstructionContent<'a>,
    contents: Vec<ConversationTurn>,
    generation_config: &'a GenerationConfig,
    safety_settings: &'a [SafetySetting],
}

#[derive(Serialize)]
struct InstructionContent<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct UploadStartBody<'a> {
    file: UploadStartFile<'a>,
}

#[derive(Serialize)]
struct UploadStartFile<'a> {
    display_name: &'a str,
}

#[derive(Deserialize)]
struct UploadFinishResponse {
    file: RemoteFile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, ApiError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            let feedback = self
                .prompt_feedback
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(ApiError::Upstream(format!(
                "Gemini returned no text: {}",
                feedback
            )));
        }

        Ok(text)
    }
}

/// Gemini REST client (Generative Language API, v1beta)
#[derive(Clone)]
pub struct GeminiService {
    client: Client,
    config: GeminiConfig,
}

impl GeminiService {
    /// Build outside any async context: the blocking client owns a runtime.
    pub fn new(config: GeminiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/v1beta/{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    fn check(
        response: reqwest::blocking::Response,
        what: &str,
    ) -> Result<reqwest::blocking::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response.text().unwrap_or_default();
        Err(ApiError::Upstream(format!(
            "Gemini {} failed ({}): {}",
            what, status, text
        )))
    }
}

impl GenerativeBackend for GeminiService {
    fn upload_file(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, ApiError> {
        let bytes = std::fs::read(path)?;
        let start_url = format!(
            "{}/upload/v1beta/files",
            self.config.base_url.trim_end_matches('/')
        );

        debug!(
            "Starting resumable upload of {} ({} bytes, {})",
            path.display(),
            bytes.len(),
            mime_type
        );

        let start = self
            .client
            .post(&start_url)
            .header("x-goog-api-key", &self.config.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadStartBody {
                file: UploadStartFile { display_name },
            })
            .send()
            .map_err(|e| ApiError::Upstream(format!("Gemini upload start error: {}", e)))?;
        let start = Self::check(start, "upload start")?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Upstream("Gemini upload start returned no upload URL".into()))?;

        let finish = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .map_err(|e| ApiError::Upstream(format!("Gemini upload error: {}", e)))?;
        let finish = Self::check(finish, "upload")?;

        let body: UploadFinishResponse = finish
            .json()
            .map_err(|e| ApiError::Upstream(format!("Failed to parse Gemini upload: {}", e)))?;

        info!("Uploaded {} as {}", path.display(), body.file.name);
        Ok(body.file)
    }

    fn get_file(&self, name: &str) -> Result<RemoteFile, ApiError> {
        let response = self
            .client
            .get(self.api_url(name))
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .map_err(|e| ApiError::Upstream(format!("Gemini get file error: {}", e)))?;

        Self::check(response, "get file")?
            .json()
            .map_err(|e| ApiError::Upstream(format!("Failed to parse Gemini file: {}", e)))
    }

    fn generate(&self, request: GenerateRequest) -> Result<String, ApiError> {
        let mut contents = request.history;
        contents.push(ConversationTurn::user(request.message));

        debug!(
            "generateContent on {} with {} turns",
            request.model,
            contents.len()
        );

        let body = GenerateContentBody {
            system_instruction: InstructionContent {
                parts: vec![TextPart {
                    text: &request.system_instruction,
                }],
            },
            contents,
            generation_config: &request.config,
            safety_settings: &request.safety_settings,
        };

        let url = self.api_url(&format!("models/{}:generateContent", request.model));
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| ApiError::Upstream(format!("Gemini generate error: {}", e)))?;

        let parsed: GenerateContentResponse = Self::check(response, "generateContent")?
            .json()
            .map_err(|e| ApiError::Upstream(format!("Failed to parse Gemini reply: {}", e)))?;

        parsed.into_text()
    }
}
