use crate::state::StateHandle;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by a capability. The runtime records the reason in a
/// tool-result event before propagating it.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct ToolError {
    pub reason: String,
}

impl ToolError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Execution context handed to a capability.
///
/// Gives the capability access to the session state it runs within, so
/// side effects on state are possible without the capability knowing
/// anything else about the session.
#[derive(Debug, Clone)]
pub struct ToolContext {
    state: StateHandle,
}

impl ToolContext {
    pub fn new(state: StateHandle) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }
}

/// An invocable capability with a name, an input schema, and an async
/// execution function. Stateless from the runtime's perspective; side
/// effects are the capability's own responsibility.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> String;

    fn description(&self) -> String;

    /// JSON Schema describing the `args` object passed to `call`.
    fn parameters(&self) -> Value;

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<String, ToolError>;
}

/// Reports the current UTC time.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> String {
        "current_time".to_string()
    }

    fn description(&self) -> String {
        "Get the current date and time (UTC, RFC 3339)".to_string()
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn call(&self, _ctx: &ToolContext, _args: Value) -> Result<String, ToolError> {
        Ok(chrono::Utc::now().to_rfc3339())
    }
}
