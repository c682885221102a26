use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rand::{distr::Alphanumeric, Rng};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{Session, SessionDraft, SessionId};
use crate::utils::error::ApiError;

/// Length of generated session tokens (62-symbol alphabet)
pub const SESSION_ID_LEN: usize = 32;

/// Regeneration attempts before giving up on a fresh id
const MAX_ID_ATTEMPTS: usize = 8;

/// Process-wide session table.
/// DashMap shards the locking so worker threads and request tasks can both
/// touch it; each session also gets a turn lock so overlapping messages for
/// one session run one after another.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
    turn_locks: DashMap<SessionId, Arc<Mutex<()>>>,
    /// Ids of deleted sessions, never handed out again
    retired: DashSet<SessionId>,
}

impl SessionStore {
    pub fn new() -> Self {
        info!("Initializing session store");
        Self::default()
    }

    /// Cryptographically random alphanumeric token
    pub fn generate_id() -> SessionId {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect()
    }

    /// Insert a record under a caller-chosen id
    pub fn create(&self, id: SessionId, record: Session) -> Result<(), ApiError> {
        if self.retired.contains(&id) {
            return Err(ApiError::DuplicateSession(id));
        }

        match self.sessions.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                Err(ApiError::DuplicateSession(entry.key().clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                debug!("Created session {}", entry.key());
                entry.insert(record);
                Ok(())
            }
        }
    }

    /// Generate a fresh id and insert the draft under it
    pub fn create_session(&self, draft: SessionDraft) -> Result<Session, ApiError> {
        self.create_with(draft, Self::generate_id)
    }

    fn create_with<F>(&self, draft: SessionDraft, mut next_id: F) -> Result<Session, ApiError>
    where
        F: FnMut() -> SessionId,
    {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = next_id();
            let session = draft.clone().into_session(id.clone());

            match self.create(id, session.clone()) {
                Ok(()) => return Ok(session),
                Err(ApiError::DuplicateSession(id)) => {
                    warn!("Session id collision on {}, regenerating", id);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ApiError::Internal(
            "could not allocate a unique session id".to_string(),
        ))
    }

    pub fn get(&self, id: &str) -> Result<Session, ApiError> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Mutate a record in place while holding its shard lock
    pub fn update<F>(&self, id: &str, mutator: F) -> Result<Session, ApiError>
    where
        F: FnOnce(&mut Session),
    {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))?;

        mutator(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Lock serializing conversation turns of one session
    pub fn turn_lock(&self, id: &str) -> Result<Arc<Mutex<()>>, ApiError> {
        if !self.sessions.contains_key(id) {
            return Err(ApiError::SessionNotFound(id.to_string()));
        }

        Ok(self
            .turn_locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Remove the record and best-effort delete the local artifact.
    ///
    /// Waits for an in-flight turn of the same session to finish first; a
    /// turn queued behind the delete sees `SessionNotFound`. The returned
    /// record still carries `history_location` for the caller to clean up.
    pub fn delete(&self, id: &str) -> Result<Session, ApiError> {
        let lock = self.turn_lock(id)?;
        let _turn = lock.lock();

        // A concurrent delete may have won the lock first
        let (id, session) = self
            .sessions
            .remove(id)
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))?;

        self.turn_locks.remove(&id);
        self.retired.insert(id.clone());

        remove_backing_file(&session.local_artifact_path, "local file");

        info!("Deleted session {}", id);
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn remove_backing_file(path: &Path, label: &str) {
    match std::fs::remove_file(path) {
        Ok(()) => info!("Deleted {}: {}", label, path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("{} not found: {}", label, path.display())
        }
        Err(e) => warn!("Failed to delete {} {}: {}", label, path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn draft(path: PathBuf) -> SessionDraft {
        SessionDraft {
            local_artifact_path: path,
            remote_artifact_name: "files/abc".to_string(),
            file_uri: "https://example.test/files/abc".to_string(),
        }
    }

    #[test]
    fn test_generated_ids_are_long_and_alphanumeric() {
        let id = SessionStore::generate_id();
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, SessionStore::generate_id());
    }

    #[test]
    fn test_create_get_update() {
        let store = SessionStore::new();
        let session = store.create_session(draft("upload.txt".into())).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&session.id).unwrap().remote_artifact_name, "files/abc");

        let updated = store
            .update(&session.id, |s| {
                s.history_location = Some(PathBuf::from("history.json"))
            })
            .unwrap();
        assert_eq!(updated.history_location, Some(PathBuf::from("history.json")));
    }

    #[test]
    fn test_duplicate_id_is_rejected_not_overwritten() {
        let store = SessionStore::new();
        let first = draft("a.txt".into()).into_session("fixed".into());
        let second = draft("b.txt".into()).into_session("fixed".into());

        store.create("fixed".into(), first).unwrap();
        let err = store.create("fixed".into(), second).unwrap_err();

        assert!(matches!(err, ApiError::DuplicateSession(_)));
        assert_eq!(
            store.get("fixed").unwrap().local_artifact_path,
            PathBuf::from("a.txt")
        );
    }

    #[test]
    fn test_collision_triggers_regeneration() {
        let store = SessionStore::new();
        store
            .create("taken".into(), draft("a.txt".into()).into_session("taken".into()))
            .unwrap();

        let mut ids = vec!["fresh".to_string(), "taken".to_string()];
        let session = store
            .create_with(draft("b.txt".into()), || ids.pop().unwrap())
            .unwrap();

        assert_eq!(session.id, "fresh");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_deleted_ids_are_never_reused() {
        let store = SessionStore::new();
        store
            .create("gone".into(), draft("a.txt".into()).into_session("gone".into()))
            .unwrap();
        store.delete("gone").unwrap();

        let err = store
            .create("gone".into(), draft("a.txt".into()).into_session("gone".into()))
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateSession(_)));
    }

    #[test]
    fn test_delete_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("upload.txt");
        let history = dir.path().join("history.json");

        let store = SessionStore::new();
        let session = store.create_session(draft(artifact)).unwrap();
        store
            .update(&session.id, |s| s.history_location = Some(history.clone()))
            .unwrap();

        let removed = store.delete(&session.id).unwrap();

        assert!(store.is_empty());
        assert_eq!(removed.history_location, Some(history));
        assert!(matches!(
            store.delete(&session.id),
            Err(ApiError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_delete_removes_local_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("upload.txt");
        std::fs::write(&artifact, "Alice: hi").unwrap();

        let store = SessionStore::new();
        let session = store.create_session(draft(artifact.clone())).unwrap();
        store.delete(&session.id).unwrap();

        assert!(!artifact.exists());
    }

    #[test]
    fn test_delete_waits_for_running_turn() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        let store = Arc::new(SessionStore::new());
        let session = store.create_session(draft("upload.txt".into())).unwrap();

        let lock = store.turn_lock(&session.id).unwrap();
        let guard = lock.lock();

        let deleted = Arc::new(AtomicBool::new(false));
        let handle = {
            let store = store.clone();
            let deleted = deleted.clone();
            let id = session.id.clone();
            std::thread::spawn(move || {
                store.delete(&id).unwrap();
                deleted.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(100));
        assert!(!deleted.load(Ordering::SeqCst), "delete ran during a turn");
        assert!(store.contains(&session.id));

        drop(guard);
        handle.join().unwrap();
        assert!(deleted.load(Ordering::SeqCst));
        assert!(!store.contains(&session.id));
    }

    #[test]
    fn test_unknown_session_lookups_fail() {
        let store = SessionStore::new();

        assert!(matches!(store.get("nope"), Err(ApiError::SessionNotFound(_))));
        assert!(store.turn_lock("nope").is_err());
        assert!(store.update("nope", |_| {}).is_err());
    }
}
