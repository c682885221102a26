use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::{seed_history, ConversationTurn, History, Part, SessionDraft, SessionId};
use crate::services::gemini::{GenerateRequest, GenerationConfig, GenerativeBackend, SafetySetting};
use crate::services::history::HistoryStore;
use crate::services::ingestion::IngestionOutcome;
use crate::services::session_store::SessionStore;
use crate::utils::error::ApiError;

/// Persona chat over an ingested transcript.
///
/// Every method blocks (history I/O, backend calls); callers hand them to
/// the dispatcher.
pub struct ConversationEngine {
    sessions: Arc<SessionStore>,
    history: Arc<HistoryStore>,
    backend: Arc<dyn GenerativeBackend>,
    chat_model: String,
}

impl ConversationEngine {
    pub fn new(
        sessions: Arc<SessionStore>,
        history: Arc<HistoryStore>,
        backend: Arc<dyn GenerativeBackend>,
        chat_model: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            history,
            backend,
            chat_model: chat_model.into(),
        }
    }

    /// Register a session for an ingested artifact and persist its seed turns
    pub fn open_session(
        &self,
        local_artifact_path: &Path,
        outcome: &IngestionOutcome,
    ) -> Result<SessionId, ApiError> {
        let session = self.sessions.create_session(SessionDraft {
            local_artifact_path: local_artifact_path.to_path_buf(),
            remote_artifact_name: outcome.remote_file.name.clone(),
            file_uri: outcome.file_uri.clone(),
        })?;

        let seed = seed_history(outcome.file_data());
        let location = match self.history.save(&session.id, &seed) {
            Ok(location) => location,
            Err(e) => {
                // Don't leave a session behind that has no history
                if let Err(cleanup) = self.sessions.delete(&session.id) {
                    warn!("Failed to discard session {}: {}", session.id, cleanup);
                }
                return Err(e);
            }
        };

        self.sessions.update(&session.id, |s| {
            s.history_location = Some(location);
        })?;

        info!("Opened session {} for {}", session.id, outcome.file_uri);
        Ok(session.id)
    }

    /// Destroy a session: record, local artifact and history file.
    /// A turn already running for it finishes (and saves) first.
    pub fn close_session(&self, session_id: &str) -> Result<(), ApiError> {
        let session = self.sessions.delete(session_id)?;

        if let Some(location) = &session.history_location {
            if let Err(e) = self.history.remove(location) {
                warn!("Failed to delete history {}: {}", location.display(), e);
            }
        }

        let age = Utc::now().signed_duration_since(session.created_at);
        info!(
            "Closed session {} after {}s",
            session_id,
            age.num_seconds()
        );
        Ok(())
    }

    /// One persona turn: load history, ask the model, append both turns,
    /// persist once.
    pub fn send(
        &self,
        utterance: &str,
        persona_name: &str,
        persona_description: &str,
        session_id: &str,
    ) -> Result<History, ApiError> {
        if !self.sessions.contains(session_id) {
            return Err(ApiError::SessionNotFound(session_id.to_string()));
        }
        if utterance.trim().is_empty() {
            return Err(ApiError::EmptyUtterance);
        }

        let lock = self.sessions.turn_lock(session_id)?;
        let _turn = lock.lock();

        // Re-read under the lock; a concurrent turn may have moved the history
        let session = self.sessions.get(session_id)?;
        let mut history = self.history.load(session.history_location.as_deref());
        debug!(
            "Session {}: {} prior turns, persona '{}'",
            session_id,
            history.len(),
            persona_name
        );

        let reply = self
            .backend
            .generate(GenerateRequest {
                model: self.chat_model.clone(),
                system_instruction: Self::persona_instruction(persona_name, persona_description),
                history: history.clone(),
                message: vec![Part::text(utterance)],
                config: GenerationConfig::conversation(),
                safety_settings: SafetySetting::block_none(),
            })
            .map_err(|e| {
                error!("Error during conversation for session {}: {}", session_id, e);
                ApiError::ConversationFailed(e.to_string())
            })?;

        history.push(ConversationTurn::user(vec![Part::text(utterance)]));
        history.push(ConversationTurn::model(vec![Part::text(reply)]));

        let location = self.history.save(session_id, &history)?;
        self.sessions.update(session_id, |s| {
            s.history_location = Some(location);
        })?;

        Ok(history)
    }

    pub fn persona_instruction(persona_name: &str, persona_description: &str) -> String {
        let mut instruction = format!(
            "You're portraying '{name}', taking on the role of a friend or relative. \
             Use the chat uploaded to understand how to represent '{name}' accurately. \
             Answer questions from users directly and avoid evasion. \
             Emojis should be avoided unless the conversation uses them; if it does, \
             use your discretion in responding. Always respond in HTML form.",
            name = persona_name
        );

        if !persona_description.trim().is_empty() {
            instruction.push_str(" The description of this person is as described: ");
            instruction.push_str(persona_description);
        }

        instruction
    }
}
