use serde::{Deserialize, Serialize};

use super::conversation::{FileData, History, LatestExchange};

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize, Default)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub chat: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StopRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Detected participants, a JSON array when the model complied
    #[serde(rename = "People")]
    pub people: serde_json::Value,
    pub file_data: FileData,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub history: History,
    pub latest: LatestExchange,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub status: &'static str,
}
