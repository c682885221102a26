use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::models::History;
use crate::utils::error::ApiError;

/// Persists one JSON history file per session
pub struct HistoryStore {
    root: PathBuf,
}

impl HistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ApiError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn location_for(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", session_id))
    }

    /// Overwrite the session's history and return where it lives.
    /// Written to a sibling temp file first, then renamed into place.
    pub fn save(&self, session_id: &str, history: &History) -> Result<PathBuf, ApiError> {
        let location = self.location_for(session_id);
        let staging = location.with_extension("json.tmp");

        let encoded = serde_json::to_vec_pretty(history)
            .map_err(|e| ApiError::Internal(format!("Failed to encode history: {}", e)))?;

        fs::write(&staging, encoded)?;
        fs::rename(&staging, &location)?;

        info!(
            "Saved history ({} turns) to {}",
            history.len(),
            location.display()
        );
        Ok(location)
    }

    pub fn try_load(&self, location: &Path) -> Result<History, ApiError> {
        let failure = |reason: String| ApiError::HistoryLoadFailure {
            location: location.to_path_buf(),
            reason,
        };

        let raw = fs::read(location).map_err(|e| failure(e.to_string()))?;
        let history: History = serde_json::from_slice(&raw).map_err(|e| failure(e.to_string()))?;

        debug!("Loaded {} turns from {}", history.len(), location.display());
        Ok(history)
    }

    /// Delete a history file; one that is already gone is not an error.
    /// Returns whether a file was removed.
    pub fn remove(&self, location: &Path) -> Result<bool, ApiError> {
        match fs::remove_file(location) {
            Ok(()) => {
                info!("Deleted history file: {}", location.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("History file not found: {}", location.display());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Missing or corrupt history degrades to an empty one
    pub fn load(&self, location: Option<&Path>) -> History {
        let Some(location) = location else {
            return History::new();
        };

        match self.try_load(location) {
            Ok(history) => history,
            Err(e) => {
                warn!("{}; continuing with empty history", e);
                History::new()
            }
        }
    }
}
