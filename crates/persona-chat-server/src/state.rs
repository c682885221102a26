use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::services::{
    ConversationEngine, Dispatcher, GenerativeBackend, HistoryStore, IngestionPipeline,
    SessionStore,
};
use crate::utils::error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: Arc<SessionStore>,
    pub history: Arc<HistoryStore>,
    pub ingestion: Arc<IngestionPipeline>,
    pub engine: Arc<ConversationEngine>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    /// Wire every service around one backend. Creates the storage
    /// directories and starts the worker pool.
    pub fn new(settings: Settings, backend: Arc<dyn GenerativeBackend>) -> Result<Self, ApiError> {
        std::fs::create_dir_all(&settings.storage.upload_dir)?;

        let sessions = Arc::new(SessionStore::new());
        let history = Arc::new(HistoryStore::new(&settings.storage.history_dir)?);
        let ingestion = Arc::new(IngestionPipeline::new(
            backend.clone(),
            &settings.ingestion,
            settings.gemini.detection_model.clone(),
        ));
        let engine = Arc::new(ConversationEngine::new(
            sessions.clone(),
            history.clone(),
            backend,
            settings.gemini.chat_model.clone(),
        ));
        let dispatcher = Dispatcher::new(&settings.dispatcher)?;

        info!(
            "State ready: uploads in {}, histories in {}",
            settings.storage.upload_dir.display(),
            history.root().display()
        );

        Ok(Self {
            settings: Arc::new(settings),
            sessions,
            history,
            ingestion,
            engine,
            dispatcher,
        })
    }
}
