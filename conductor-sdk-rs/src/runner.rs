use crate::agent::{Agent, RunContext, RunError};
use crate::events::Event;
use crate::session::{Session, SessionError, SessionManager};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Entry point for executing the root agent against a session.
///
/// Each run appends the incoming message as a user event, drives the root
/// agent, and persists every event before forwarding it to the caller.
/// Runs against the same session serialize on the session's run gate;
/// independent sessions proceed concurrently.
pub struct Runner {
    app_name: String,
    agent: Arc<Agent>,
    sessions: Arc<SessionManager>,
}

impl Runner {
    pub fn new(app_name: &str, agent: Agent, sessions: Arc<SessionManager>) -> Self {
        Self {
            app_name: app_name.to_string(),
            agent: Arc::new(agent),
            sessions,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Resolves the session and starts a run. The returned stream yields
    /// every event the run produces, ending with exactly one terminal
    /// event; the caller extracts the final response (the runner does not
    /// filter).
    pub async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<RunStream, SessionError> {
        let session = self.sessions.get(&self.app_name, user_id, session_id).await?;
        Ok(self.run_session(session, message))
    }

    /// Starts a run against an already-resolved session.
    pub fn run_session(&self, session: Arc<Session>, message: &str) -> RunStream {
        let (tx, rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let agent = self.agent.clone();
        let message = message.to_string();
        let run_cancel = cancel.clone();

        tokio::spawn(async move {
            // Hold the gate for the whole run so two runs on one session
            // never interleave their writes.
            let _gate = session.run_gate().clone().lock_owned().await;
            let ctx = RunContext::new(session.clone(), tx, run_cancel);

            ctx.emit(Event::message("user", message.as_str())).await;

            let root = agent.name().to_string();
            match agent.run(&ctx, &message, true).await {
                Ok(_) => {
                    tracing::debug!("run on {} completed", session.key());
                }
                Err(RunError::Cancelled) => {
                    tracing::info!("run on {} cancelled", session.key());
                    ctx.emit(Event::cancelled(&root)).await;
                }
                Err(err) => {
                    tracing::warn!("run on {} failed: {err}", session.key());
                    ctx.emit(Event::error(&root, err.kind(), &err.to_string())).await;
                }
            }
        });

        RunStream {
            events: ReceiverStream::new(rx),
            cancel,
        }
    }
}

/// Lazy, finite sequence of one run's events. Not restartable: once
/// consumed, a new run must be started.
pub struct RunStream {
    events: ReceiverStream<Event>,
    cancel: CancellationToken,
}

impl RunStream {
    /// Requests cancellation. Takes effect at the run's next suspension
    /// point; an in-flight capability call finishes on its own terms. A
    /// best-effort cancelled event closes the stream.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Convenience for callers not using `StreamExt`.
    pub async fn next_event(&mut self) -> Option<Event> {
        use futures::StreamExt;
        self.events.next().await
    }

    /// Drains the stream, returning every remaining event.
    pub async fn collect_events(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}

impl futures::Stream for RunStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LeafAgent;
    use crate::events::EventPayload;
    use crate::oracle::{
        ActionRequest, Decision, DecisionRequest, Oracle, OracleError,
    };
    use crate::session::CreateMode;
    use crate::state::State;
    use crate::tools::{Tool, ToolContext, ToolError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedOracle {
        decisions: Mutex<VecDeque<Decision>>,
    }

    impl ScriptedOracle {
        fn new(decisions: Vec<Decision>) -> Arc<Self> {
            Arc::new(Self {
                decisions: Mutex::new(decisions.into()),
            })
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn decide(&self, _request: DecisionRequest<'_>) -> Result<Decision, OracleError> {
            self.decisions
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| OracleError::Request("script exhausted".to_string()))
        }
    }

    /// Keeps requesting the same action forever.
    struct RestlessOracle;

    #[async_trait]
    impl Oracle for RestlessOracle {
        async fn decide(&self, _request: DecisionRequest<'_>) -> Result<Decision, OracleError> {
            Ok(Decision::Act {
                actions: vec![ActionRequest {
                    name: "pause".to_string(),
                    call_id: "c".to_string(),
                    arguments: json!({}),
                    thought: None,
                }],
            })
        }
    }

    struct PauseTool;

    #[async_trait]
    impl Tool for PauseTool {
        fn name(&self) -> String {
            "pause".to_string()
        }

        fn description(&self) -> String {
            "Sleeps briefly".to_string()
        }

        fn parameters(&self) -> serde_json::Value {
            json!({ "type": "object", "properties": {} })
        }

        async fn call(
            &self,
            _ctx: &ToolContext,
            _args: serde_json::Value,
        ) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok("paused".to_string())
        }
    }

    fn final_answer(content: &str) -> Decision {
        Decision::Final {
            content: content.to_string(),
        }
    }

    fn runner_with(agent: Agent) -> Runner {
        Runner::new("app", agent, Arc::new(SessionManager::new()))
    }

    async fn seeded_session(runner: &Runner) -> Arc<Session> {
        runner
            .sessions()
            .create("app", "user", Some("s1"), State::new(), CreateMode::Strict)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn run_streams_user_message_then_terminal_response() {
        let oracle = ScriptedOracle::new(vec![final_answer("hello there")]);
        let runner = runner_with(Agent::Leaf(LeafAgent::new("greeter", oracle)));
        seeded_session(&runner).await;

        let stream = runner.run("user", "s1", "hi").await.unwrap();
        let events = stream.collect_events().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].author, "user");
        assert!(!events[0].terminal);
        assert!(events[1].is_final_response());
        assert_eq!(events[1].content(), Some("hello there"));

        // Exactly one terminal event, and it is last.
        let terminal_count = events.iter().filter(|e| e.terminal).count();
        assert_eq!(terminal_count, 1);
        assert!(events.last().unwrap().terminal);
    }

    #[tokio::test]
    async fn run_on_unknown_session_is_not_found() {
        let oracle = ScriptedOracle::new(vec![final_answer("x")]);
        let runner = runner_with(Agent::Leaf(LeafAgent::new("greeter", oracle)));
        assert!(matches!(
            runner.run("user", "missing", "hi").await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_run_ends_with_terminal_error_event() {
        let oracle = ScriptedOracle::new(vec![Decision::Act {
            actions: vec![ActionRequest {
                name: "undeclared".to_string(),
                call_id: "c1".to_string(),
                arguments: json!({}),
                thought: None,
            }],
        }]);
        let runner = runner_with(Agent::Leaf(LeafAgent::new("worker", oracle)));
        seeded_session(&runner).await;

        let events = runner
            .run("user", "s1", "go")
            .await
            .unwrap()
            .collect_events()
            .await;

        let last = events.last().unwrap();
        assert!(last.terminal);
        match &last.payload {
            EventPayload::Error { kind, message } => {
                assert_eq!(kind, "unknown_action");
                assert!(message.contains("undeclared"));
            }
            other => panic!("expected error payload, got {other:?}"),
        }
        // Nothing after the failure marker.
        assert_eq!(events.iter().filter(|e| e.terminal).count(), 1);
    }

    #[tokio::test]
    async fn restless_oracle_is_stopped_by_the_action_limit() {
        let agent = Agent::Leaf(
            LeafAgent::new("worker", Arc::new(RestlessOracle))
                .with_tool(Arc::new(PauseTool))
                .with_max_rounds(4),
        );
        let runner = runner_with(agent);
        seeded_session(&runner).await;

        let events = runner
            .run("user", "s1", "go")
            .await
            .unwrap()
            .collect_events()
            .await;

        let last = events.last().unwrap();
        assert!(matches!(
            &last.payload,
            EventPayload::Error { kind, .. } if kind == "action_limit_exceeded"
        ));
        // user message + 4 rounds of (call, result) + error marker
        assert_eq!(events.len(), 1 + 4 * 2 + 1);
    }

    #[tokio::test]
    async fn sequential_failure_references_the_failing_child() {
        let ok = ScriptedOracle::new(vec![final_answer("fine")]);
        let bad = ScriptedOracle::new(vec![Decision::Act {
            actions: vec![ActionRequest {
                name: "ghost".to_string(),
                call_id: "c1".to_string(),
                arguments: json!({}),
                thought: None,
            }],
        }]);
        let unreached = ScriptedOracle::new(vec![final_answer("never")]);
        let pipeline = crate::agent::SequentialAgent::new(
            "pipeline",
            vec![
                Agent::Leaf(LeafAgent::new("a", ok)),
                Agent::Leaf(LeafAgent::new("b", bad)),
                Agent::Leaf(LeafAgent::new("c", unreached)),
            ],
        );
        let runner = runner_with(Agent::Sequential(pipeline));
        seeded_session(&runner).await;

        let events = runner
            .run("user", "s1", "go")
            .await
            .unwrap()
            .collect_events()
            .await;

        // a's message, then the failure marker; c never produced events.
        assert!(events.iter().any(|e| e.author == "a"));
        assert!(!events.iter().any(|e| e.author == "c"));
        let last = events.last().unwrap();
        assert!(matches!(
            &last.payload,
            EventPayload::Error { message, .. } if message.contains("'b'")
        ));
    }

    #[tokio::test]
    async fn cancellation_appends_terminal_cancelled_event() {
        let agent = Agent::Leaf(
            LeafAgent::new("worker", Arc::new(RestlessOracle))
                .with_tool(Arc::new(PauseTool))
                .with_max_rounds(10_000),
        );
        let runner = runner_with(agent);
        seeded_session(&runner).await;

        let mut stream = runner.run("user", "s1", "go").await.unwrap();
        // Let a round or two happen, then cancel.
        let mut events = Vec::new();
        events.push(stream.next_event().await.unwrap());
        events.push(stream.next_event().await.unwrap());
        stream.cancel();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }

        let last = events.last().unwrap();
        assert!(last.terminal);
        assert!(matches!(last.payload, EventPayload::Cancelled));
        assert_eq!(events.iter().filter(|e| e.terminal).count(), 1);
    }

    #[tokio::test]
    async fn concurrent_runs_on_one_session_do_not_interleave() {
        let decisions = |tag: &str| {
            vec![
                Decision::Act {
                    actions: vec![ActionRequest {
                        name: "pause".to_string(),
                        call_id: format!("{tag}-1"),
                        arguments: json!({}),
                        thought: None,
                    }],
                },
                final_answer(tag),
            ]
        };
        // One oracle shared across both runs: decisions interleave at the
        // oracle only if runs interleave at the session.
        let oracle = ScriptedOracle::new([decisions("first"), decisions("second")].concat());
        let agent = Agent::Leaf(
            LeafAgent::new("worker", oracle).with_tool(Arc::new(PauseTool)),
        );
        let runner = Arc::new(runner_with(agent));
        let session = seeded_session(&runner).await;

        let first = runner.run_session(session.clone(), "one");
        let second = runner.run_session(session.clone(), "two");
        let (a, b) = tokio::join!(first.collect_events(), second.collect_events());
        assert!(!a.is_empty() && !b.is_empty());

        // In the shared log, each run's events form one contiguous block:
        // a user message, then that run's events through its terminal.
        let log = session.events().list().await;
        assert_eq!(log.iter().filter(|e| e.terminal).count(), 2);
        let first_terminal = log.iter().position(|e| e.terminal).unwrap();
        let user_messages: Vec<_> = log
            .iter()
            .enumerate()
            .filter(|(_, e)| e.author == "user")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(user_messages.len(), 2);
        // The second run's user message comes after the first terminal.
        assert!(user_messages[1] > first_terminal);
    }

    #[tokio::test]
    async fn independent_sessions_run_concurrently() {
        let oracle = ScriptedOracle::new(vec![final_answer("a"), final_answer("b")]);
        let runner = Arc::new(runner_with(Agent::Leaf(LeafAgent::new("worker", oracle))));
        for id in ["s1", "s2"] {
            runner
                .sessions()
                .create("app", "user", Some(id), State::new(), CreateMode::Strict)
                .await
                .unwrap();
        }

        let one = runner.run("user", "s1", "hi").await.unwrap();
        let two = runner.run("user", "s2", "hi").await.unwrap();
        let (a, b) = tokio::join!(one.collect_events(), two.collect_events());

        assert!(a.last().unwrap().terminal);
        assert!(b.last().unwrap().terminal);
        // Each session's log holds only its own run.
        let s1 = runner.sessions().get("app", "user", "s1").await.unwrap();
        assert_eq!(s1.events().len().await, 2);
    }
}
