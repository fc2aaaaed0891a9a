use crate::prompts::BASE_PROMPT;
use crate::state::State;
use async_trait::async_trait;
use genai::Client;
use genai::chat::{ChatMessage, ChatRequest, ChatRole, ContentPart, ToolResponse};
use serde::Deserialize;
use serde_json::Value;
use std::env;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("reasoning request failed: {0}")]
    Request(String),
    #[error("malformed oracle output: {0}")]
    Malformed(String),
}

/// Whether a declared action routes to a capability or to a sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Tool,
    SubAgent,
}

/// One action an agent declares to its oracle: a capability or a
/// delegation target, described by name, purpose, and input schema.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub kind: ActionKind,
}

/// An action the oracle asked the agent to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub name: String,
    pub call_id: String,
    pub arguments: Value,
    pub thought: Option<String>,
}

/// Outcome of one oracle consultation: either the final textual answer or
/// an ordered list of actions to execute before asking again.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Final { content: String },
    Act { actions: Vec<ActionRequest> },
}

/// Transcript of the current decision loop, fed back to the oracle each
/// round so it sees its own prior requests and their observations.
#[derive(Debug, Clone)]
pub enum TranscriptEntry {
    User { content: String },
    Assistant { actions: Vec<ActionRequest> },
    Observation { call_id: String, content: String },
}

/// Everything an oracle sees when deciding the next step.
pub struct DecisionRequest<'a> {
    /// Behavior descriptor of the asking agent; opaque to the runtime.
    pub instructions: &'a str,
    /// Point-in-time snapshot of the session state.
    pub state: &'a State,
    pub transcript: &'a [TranscriptEntry],
    pub available_actions: &'a [ActionSpec],
}

/// External reasoning function consulted by leaf agents. Opaque to the
/// runtime beyond this contract.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, OracleError>;
}

#[derive(Deserialize, Clone, Debug)]
pub struct OracleConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub reasoning_effort: Option<String>,
}

/// Language-model-backed oracle.
#[derive(Clone)]
pub struct LlmOracle {
    pub model: String,
    pub client: Client,
    pub api_key: Option<String>,
    pub reasoning_effort: Option<String>,
}

impl LlmOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            model: config.model,
            client: Client::default(),
            api_key: config.api_key,
            reasoning_effort: config.reasoning_effort,
        }
    }

    fn system_message(&self, instructions: &str, state: &State) -> String {
        let mut message = format!("{}\n\n{}", BASE_PROMPT, instructions);
        if !state.is_empty() {
            let rendered = serde_json::to_string_pretty(
                &state.iter().collect::<std::collections::BTreeMap<_, _>>(),
            )
            .unwrap_or_default();
            message.push_str("\n\n<SESSION_STATE>\n");
            message.push_str(&rendered);
            message.push_str("\n</SESSION_STATE>");
        }
        message
    }

    fn chat_messages(&self, request: &DecisionRequest<'_>) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(
            self.system_message(request.instructions, request.state),
        )];

        for entry in request.transcript {
            match entry {
                TranscriptEntry::User { content } => {
                    messages.push(ChatMessage::user(content.clone()));
                }
                TranscriptEntry::Assistant { actions } => {
                    let mut parts = vec![];
                    for action in actions {
                        if let Some(thought) = &action.thought {
                            parts.push(ContentPart::Text(thought.clone()));
                        }
                    }
                    for action in actions {
                        parts.push(ContentPart::ToolCall(genai::chat::ToolCall {
                            call_id: action.call_id.clone(),
                            fn_name: action.name.clone(),
                            fn_arguments: action.arguments.clone(),
                        }));
                    }
                    messages.push(ChatMessage {
                        role: ChatRole::Assistant,
                        content: parts.into(),
                        options: None,
                    });
                }
                TranscriptEntry::Observation { call_id, content } => {
                    messages.push(ChatMessage::from(ToolResponse::new(
                        call_id.clone(),
                        content.clone(),
                    )));
                }
            }
        }

        messages
    }

    fn declared_tools(&self, actions: &[ActionSpec]) -> Option<Vec<genai::chat::Tool>> {
        if actions.is_empty() {
            return None;
        }
        Some(
            actions
                .iter()
                .map(|spec| genai::chat::Tool {
                    name: spec.name.clone(),
                    description: Some(spec.description.clone()),
                    schema: Some(spec.parameters.clone()),
                    config: None,
                })
                .collect(),
        )
    }

    fn export_api_key(&self) {
        if let Some(key) = &self.api_key {
            if self.model.starts_with("gpt") && env::var("OPENAI_API_KEY").is_err() {
                unsafe {
                    env::set_var("OPENAI_API_KEY", key);
                }
            }
            if self.model.starts_with("claude") && env::var("ANTHROPIC_API_KEY").is_err() {
                unsafe {
                    env::set_var("ANTHROPIC_API_KEY", key);
                }
            }
        }
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, OracleError> {
        let messages = self.chat_messages(&request);
        let mut chat_req = ChatRequest::new(messages);
        if let Some(tools) = self.declared_tools(request.available_actions) {
            chat_req = chat_req.with_tools(tools);
        }

        self.export_api_key();

        let output = self
            .client
            .exec_chat(&self.model, chat_req, None)
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let text: String = output.content.texts().join("");
        let tool_calls: Vec<genai::chat::ToolCall> =
            output.tool_calls().iter().map(|t| (*t).clone()).collect();

        if tool_calls.is_empty() {
            return Ok(Decision::Final { content: text });
        }

        let mut actions = Vec::with_capacity(tool_calls.len());
        for (i, call) in tool_calls.into_iter().enumerate() {
            let call_id = if call.call_id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                call.call_id
            };
            actions.push(ActionRequest {
                name: call.fn_name,
                call_id,
                arguments: call.fn_arguments,
                // The model's free text accompanies the first request.
                thought: (i == 0 && !text.is_empty()).then(|| text.clone()),
            });
        }
        Ok(Decision::Act { actions })
    }
}
