use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Opaque session token
pub type SessionId = String;

/// Server-side record binding an uploaded artifact, its remote handle and
/// the persisted history. Lives only in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub local_artifact_path: PathBuf,
    pub remote_artifact_name: String,
    pub file_uri: String,
    pub history_location: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to create a session except its id
#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub local_artifact_path: PathBuf,
    pub remote_artifact_name: String,
    pub file_uri: String,
}

impl SessionDraft {
    pub fn into_session(self, id: SessionId) -> Session {
        Session {
            id,
            local_artifact_path: self.local_artifact_path,
            remote_artifact_name: self.remote_artifact_name,
            file_uri: self.file_uri,
            history_location: None,
            created_at: Utc::now(),
        }
    }
}
