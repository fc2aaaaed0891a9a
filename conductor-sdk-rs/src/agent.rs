use crate::events::Event;
use crate::oracle::{
    ActionKind, ActionRequest, ActionSpec, Decision, DecisionRequest, Oracle, OracleError,
    TranscriptEntry,
};
use crate::session::Session;
use crate::state::StateHandle;
use crate::tools::{Tool, ToolContext};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default bound on a leaf agent's call-then-observe loop.
pub const DEFAULT_MAX_ROUNDS: usize = 10;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("agent '{agent}' requested unknown action '{name}'")]
    UnknownAction { agent: String, name: String },
    #[error("agent '{agent}' exceeded the action limit of {limit} rounds")]
    ActionLimitExceeded { agent: String, limit: usize },
    #[error("capability '{name}' failed: {reason}")]
    Capability { name: String, reason: String },
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("run cancelled")]
    Cancelled,
}

impl RunError {
    /// Stable kind string recorded in the terminating error event.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::UnknownAction { .. } => "unknown_action",
            RunError::ActionLimitExceeded { .. } => "action_limit_exceeded",
            RunError::Capability { .. } => "capability_error",
            RunError::Oracle(_) => "oracle_error",
            RunError::Cancelled => "cancelled",
        }
    }
}

/// Execution context threaded through one run: the session being mutated,
/// the channel events are forwarded on, and the cancellation signal.
///
/// `emit` persists to the session's event log first, then forwards the
/// stamped event to the caller. A caller that dropped its stream stops
/// receiving, but persistence continues.
pub struct RunContext {
    session: Arc<Session>,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
}

impl RunContext {
    pub(crate) fn new(
        session: Arc<Session>,
        tx: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            tx,
            cancel,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn state(&self) -> &StateHandle {
        self.session.state()
    }

    pub async fn emit(&self, event: Event) -> Event {
        let stamped = self.session.events().append(event).await;
        let _ = self.tx.send(stamped.clone()).await;
        stamped
    }

    /// Cancellation checkpoint, placed at every suspension point.
    pub fn ensure_live(&self) -> Result<(), RunError> {
        if self.cancel.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A unit of orchestrated work. The set of variants is closed: leaves
/// consult an oracle (and become delegating agents when they declare
/// sub-agents), sequentials compose children in a fixed order.
pub enum Agent {
    Leaf(LeafAgent),
    Sequential(SequentialAgent),
}

impl Agent {
    pub fn name(&self) -> &str {
        match self {
            Agent::Leaf(agent) => &agent.name,
            Agent::Sequential(agent) => &agent.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Agent::Leaf(agent) => &agent.description,
            Agent::Sequential(agent) => &agent.description,
        }
    }

    /// Drives this agent to completion, appending its events to the
    /// session. `terminal` marks that this invocation sits in the run's
    /// terminal position, so its final message carries the terminal flag.
    /// Returns the final textual output.
    pub fn run<'a>(
        &'a self,
        ctx: &'a RunContext,
        input: &'a str,
        terminal: bool,
    ) -> BoxFuture<'a, Result<String, RunError>> {
        match self {
            Agent::Leaf(agent) => agent.run(ctx, input, terminal).boxed(),
            Agent::Sequential(agent) => agent.run(ctx, input, terminal).boxed(),
        }
    }
}

/// Delegates reasoning to an oracle and executes the actions it proposes,
/// one at a time, until the oracle produces a final answer.
pub struct LeafAgent {
    name: String,
    description: String,
    instructions: String,
    oracle: Arc<dyn Oracle>,
    tools: Vec<Arc<dyn Tool>>,
    sub_agents: Vec<Agent>,
    max_rounds: usize,
    output_key: Option<String>,
}

impl LeafAgent {
    pub fn new(name: &str, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            instructions: String::new(),
            oracle,
            tools: Vec::new(),
            sub_agents: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            output_key: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = instructions.to_string();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_sub_agent(mut self, agent: Agent) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// After the final answer, also write it into session state under
    /// `key` (recorded as a state-delta event).
    pub fn with_output_key(mut self, key: &str) -> Self {
        self.output_key = Some(key.to_string());
        self
    }

    fn action_specs(&self) -> Vec<ActionSpec> {
        let mut specs: Vec<ActionSpec> = self
            .tools
            .iter()
            .map(|tool| ActionSpec {
                name: tool.name(),
                description: tool.description(),
                parameters: tool.parameters(),
                kind: ActionKind::Tool,
            })
            .collect();
        for agent in &self.sub_agents {
            specs.push(ActionSpec {
                name: agent.name().to_string(),
                description: agent.description().to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "request": {
                            "type": "string",
                            "description": "The task to hand off to this agent"
                        }
                    },
                    "required": ["request"]
                }),
                kind: ActionKind::SubAgent,
            });
        }
        specs
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    fn find_sub_agent(&self, name: &str) -> Option<&Agent> {
        self.sub_agents.iter().find(|agent| agent.name() == name)
    }

    async fn run(
        &self,
        ctx: &RunContext,
        input: &str,
        terminal: bool,
    ) -> Result<String, RunError> {
        let specs = self.action_specs();
        let mut transcript = vec![TranscriptEntry::User {
            content: input.to_string(),
        }];

        for _round in 0..self.max_rounds {
            ctx.ensure_live()?;
            let snapshot = ctx.state().snapshot().await;
            let decision = self
                .oracle
                .decide(DecisionRequest {
                    instructions: &self.instructions,
                    state: &snapshot,
                    transcript: &transcript,
                    available_actions: &specs,
                })
                .await?;

            let actions = match decision {
                Decision::Final { content } => {
                    return self.finish(ctx, content, terminal).await;
                }
                // No actions and no answer: close the round out rather
                // than loop on an oracle that has nothing to say.
                Decision::Act { actions } if actions.is_empty() => {
                    return self.finish(ctx, String::new(), terminal).await;
                }
                Decision::Act { actions } => actions,
            };

            transcript.push(TranscriptEntry::Assistant {
                actions: actions.clone(),
            });

            for action in actions {
                ctx.ensure_live()?;
                let observation = self.execute_action(ctx, &action).await?;
                transcript.push(TranscriptEntry::Observation {
                    call_id: action.call_id.clone(),
                    content: observation,
                });
            }
        }

        Err(RunError::ActionLimitExceeded {
            agent: self.name.clone(),
            limit: self.max_rounds,
        })
    }

    /// Executes one requested action to completion and returns the
    /// observation fed back to the oracle.
    async fn execute_action(
        &self,
        ctx: &RunContext,
        action: &ActionRequest,
    ) -> Result<String, RunError> {
        if let Some(tool) = self.find_tool(&action.name) {
            ctx.emit(Event::tool_call(
                &self.name,
                &action.name,
                &action.call_id,
                action.arguments.clone(),
                action.thought.clone(),
            ))
            .await;
            tracing::info!(
                "{} invoking capability {} with args {}",
                self.name,
                action.name,
                action.arguments
            );

            let tool_ctx = ToolContext::new(ctx.state().clone());
            match tool.call(&tool_ctx, action.arguments.clone()).await {
                Ok(output) => {
                    ctx.emit(Event::tool_result(
                        &self.name,
                        &action.name,
                        &action.call_id,
                        output.clone(),
                    ))
                    .await;
                    Ok(output)
                }
                Err(err) => {
                    ctx.emit(Event::tool_failure(
                        &self.name,
                        &action.name,
                        &action.call_id,
                        err.reason.clone(),
                    ))
                    .await;
                    Err(RunError::Capability {
                        name: action.name.clone(),
                        reason: err.reason,
                    })
                }
            }
        } else if let Some(agent) = self.find_sub_agent(&action.name) {
            ctx.emit(Event::tool_call(
                &self.name,
                &action.name,
                &action.call_id,
                action.arguments.clone(),
                action.thought.clone(),
            ))
            .await;
            tracing::info!("{} delegating to {}", self.name, action.name);

            let request = action
                .arguments
                .get("request")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| action.arguments.to_string());
            // The sub-agent appends events under its own identity; its
            // final output becomes this agent's observation.
            agent.run(ctx, &request, false).await
        } else {
            Err(RunError::UnknownAction {
                agent: self.name.clone(),
                name: action.name.clone(),
            })
        }
    }

    async fn finish(
        &self,
        ctx: &RunContext,
        content: String,
        terminal: bool,
    ) -> Result<String, RunError> {
        if let Some(key) = &self.output_key {
            ctx.state().set(key.clone(), json!(content.clone())).await;
            ctx.emit(Event::state_delta(
                &self.name,
                HashMap::from([(key.clone(), json!(content.clone()))]),
            ))
            .await;
        }
        let event = if terminal {
            Event::final_response(&self.name, content.clone())
        } else {
            Event::message(&self.name, content.clone())
        };
        ctx.emit(event).await;
        Ok(content)
    }
}

/// Fixed-order composition: children run one after another against the
/// same session, so state written by child i is visible to child i+1.
/// The first failing child aborts the remainder.
pub struct SequentialAgent {
    name: String,
    description: String,
    children: Vec<Agent>,
}

impl SequentialAgent {
    pub fn new(name: &str, children: Vec<Agent>) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            children,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    async fn run(
        &self,
        ctx: &RunContext,
        input: &str,
        terminal: bool,
    ) -> Result<String, RunError> {
        let count = self.children.len();
        if count == 0 {
            if terminal {
                ctx.emit(Event::final_response(&self.name, "")).await;
            }
            return Ok(String::new());
        }

        let mut output = String::new();
        for (i, child) in self.children.iter().enumerate() {
            ctx.ensure_live()?;
            output = child.run(ctx, input, terminal && i + 1 == count).await?;
        }
        Ok(output)
    }
}
