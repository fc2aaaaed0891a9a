use conductor_sdk_rs::events::Event;
use conductor_sdk_rs::session::Session;
use conductor_sdk_rs::state::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Deserialize, Debug, Clone)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub state: HashMap<String, Value>,
    /// Replace an existing session instead of rejecting the create.
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct SessionResponse {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub state: State,
}

impl SessionResponse {
    pub fn from_session(session: &Session, state: State) -> Self {
        let key = session.key();
        Self {
            app_name: key.app_name.clone(),
            user_id: key.user_id.clone(),
            session_id: key.session_id.clone(),
            state,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct EventPage {
    pub items: Vec<Event>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RunRequest {
    pub content: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct DeleteParams {
    #[serde(default)]
    pub strict: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_request_defaults_are_lenient() {
        let req: CreateSessionRequest =
            serde_json::from_value(json!({ "user_id": "ada" })).unwrap();
        assert_eq!(req.user_id, "ada");
        assert!(req.session_id.is_none());
        assert!(req.state.is_empty());
        assert!(!req.overwrite);
    }

    #[test]
    fn create_request_accepts_initial_state() {
        let req: CreateSessionRequest = serde_json::from_value(json!({
            "user_id": "ada",
            "session_id": "s1",
            "state": { "user_name": "Ada" },
            "overwrite": true
        }))
        .unwrap();
        assert_eq!(req.state.get("user_name"), Some(&json!("Ada")));
        assert!(req.overwrite);
    }

    #[test]
    fn session_response_serializes_state_inline() {
        let mut state = State::new();
        state.set("k", json!("v"));
        let response = SessionResponse {
            app_name: "app".to_string(),
            user_id: "ada".to_string(),
            session_id: "s1".to_string(),
            state,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["state"]["k"], "v");
    }
}
