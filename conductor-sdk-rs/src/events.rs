use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One immutable step in a session's execution record.
///
/// The `sequence` index is assigned by the [`EventLog`] on append and is
/// monotonic within a session. Exactly one event per run carries the
/// `terminal` flag, and it is always the last event that run appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub terminal: bool,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Message {
        content: String,
    },
    ToolCall {
        tool_name: String,
        call_id: String,
        arguments: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        thought: Option<String>,
    },
    ToolResult {
        tool_name: String,
        call_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    StateDelta {
        changes: HashMap<String, Value>,
    },
    Error {
        kind: String,
        message: String,
    },
    Cancelled,
}

impl Event {
    fn new(author: &str, terminal: bool, payload: EventPayload) -> Self {
        Self {
            sequence: 0,
            author: author.to_string(),
            timestamp: Utc::now(),
            terminal,
            payload,
        }
    }

    pub fn message(author: &str, content: impl Into<String>) -> Self {
        Self::new(
            author,
            false,
            EventPayload::Message {
                content: content.into(),
            },
        )
    }

    /// A message that is the terminal output of its run.
    pub fn final_response(author: &str, content: impl Into<String>) -> Self {
        Self::new(
            author,
            true,
            EventPayload::Message {
                content: content.into(),
            },
        )
    }

    pub fn tool_call(
        author: &str,
        tool_name: &str,
        call_id: &str,
        arguments: Value,
        thought: Option<String>,
    ) -> Self {
        Self::new(
            author,
            false,
            EventPayload::ToolCall {
                tool_name: tool_name.to_string(),
                call_id: call_id.to_string(),
                arguments,
                thought,
            },
        )
    }

    pub fn tool_result(author: &str, tool_name: &str, call_id: &str, output: String) -> Self {
        Self::new(
            author,
            false,
            EventPayload::ToolResult {
                tool_name: tool_name.to_string(),
                call_id: call_id.to_string(),
                output: Some(output),
                error: None,
            },
        )
    }

    pub fn tool_failure(author: &str, tool_name: &str, call_id: &str, error: String) -> Self {
        Self::new(
            author,
            false,
            EventPayload::ToolResult {
                tool_name: tool_name.to_string(),
                call_id: call_id.to_string(),
                output: None,
                error: Some(error),
            },
        )
    }

    pub fn state_delta(author: &str, changes: HashMap<String, Value>) -> Self {
        Self::new(author, false, EventPayload::StateDelta { changes })
    }

    /// Terminal marker of a failed run.
    pub fn error(author: &str, kind: &str, message: &str) -> Self {
        Self::new(
            author,
            true,
            EventPayload::Error {
                kind: kind.to_string(),
                message: message.to_string(),
            },
        )
    }

    /// Terminal marker of a cancelled run.
    pub fn cancelled(author: &str) -> Self {
        Self::new(author, true, EventPayload::Cancelled)
    }

    pub fn is_final_response(&self) -> bool {
        self.terminal && matches!(self.payload, EventPayload::Message { .. })
    }

    /// Text content for message events, `None` otherwise.
    pub fn content(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Message { content } => Some(content),
            _ => None,
        }
    }
}

/// Append-only ordered record of one session's execution steps.
///
/// `append` is the only mutator. The sequence index is allocated under the
/// same write lock as the push, so concurrent appends never collide and the
/// listed indices are gapless.
#[derive(Debug, Default)]
pub struct EventLog {
    events: RwLock<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps the event with the next sequence index and appends it.
    /// Returns the stamped event.
    pub async fn append(&self, mut event: Event) -> Event {
        let mut events = self.events.write().await;
        event.sequence = events.len() as u64;
        events.push(event.clone());
        event
    }

    pub async fn list(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    /// Events with `sequence >= from`, ascending.
    pub async fn list_from(&self, from: u64) -> Vec<Event> {
        let events = self.events.read().await;
        events.iter().skip(from as usize).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}
