use crate::events::EventLog;
use crate::state::{State, StateHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(SessionKey),
    #[error("session already exists: {0}")]
    AlreadyExists(SessionKey),
}

/// Identity of a session: all three parts are opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(app_name: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

/// Persistent scope binding one state store and one event log to a
/// (app, user, session id) triple. Runs against the same session
/// serialize on `run_gate`.
#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    state: StateHandle,
    events: EventLog,
    run_gate: Arc<Mutex<()>>,
}

impl Session {
    pub fn new(key: SessionKey, initial_state: State) -> Self {
        Self {
            key,
            state: StateHandle::new(initial_state),
            events: EventLog::new(),
            run_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub(crate) fn run_gate(&self) -> &Arc<Mutex<()>> {
        &self.run_gate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateMode {
    /// Fail with `AlreadyExists` if the key is occupied.
    #[default]
    Strict,
    /// Replace an existing session, resetting its state and events.
    Overwrite,
}

/// Owns the (app, user, session id) → session index.
///
/// Safe for concurrent create/get/delete from independent tasks; sessions
/// themselves are shared out as `Arc<Session>` with no cross-session
/// visibility.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionKey, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session seeded with `initial_state`. A missing
    /// `session_id` is generated.
    pub async fn create(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        initial_state: State,
        mode: CreateMode,
    ) -> Result<Arc<Session>, SessionError> {
        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = SessionKey::new(app_name, user_id, &session_id);

        let mut sessions = self.sessions.write().await;
        if mode == CreateMode::Strict && sessions.contains_key(&key) {
            return Err(SessionError::AlreadyExists(key));
        }
        let session = Arc::new(Session::new(key.clone(), initial_state));
        sessions.insert(key, session.clone());
        Ok(session)
    }

    pub async fn get(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Arc<Session>, SessionError> {
        let key = SessionKey::new(app_name, user_id, session_id);
        self.sessions
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(SessionError::NotFound(key))
    }

    /// Removes a session and everything it owns. Idempotent unless
    /// `strict`, in which case a missing session is `NotFound`.
    pub async fn delete(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        strict: bool,
    ) -> Result<(), SessionError> {
        let key = SessionKey::new(app_name, user_id, session_id);
        let removed = self.sessions.write().await.remove(&key);
        if strict && removed.is_none() {
            return Err(SessionError::NotFound(key));
        }
        Ok(())
    }
}
