use conductor_sdk_rs::agent::{Agent, LeafAgent};
use conductor_sdk_rs::oracle::{LlmOracle, OracleConfig};
use conductor_sdk_rs::runner::Runner;
use conductor_sdk_rs::session::{CreateMode, SessionManager};
use conductor_sdk_rs::state::State;
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    conductor_sdk_rs::logger::init_logging();

    let api_key = std::env::var("OPENAI_API_KEY").ok();
    if api_key.is_none() {
        println!("OPENAI_API_KEY not set. Please set it to run this example.");
        return Ok(());
    }

    let oracle = Arc::new(LlmOracle::new(OracleConfig {
        model: "gpt-5-nano".to_string(),
        api_key,
        reasoning_effort: Some("minimal".to_string()),
    }));

    let agent = LeafAgent::new("question_answerer", oracle).with_instructions(
        "Answer questions about the user using the session state. Be brief.",
    );

    // Seed the session with facts the agent can draw on.
    let mut initial_state = State::new();
    initial_state.set("user_name", json!("Ada Lovelace"));
    initial_state.set(
        "user_preferences",
        json!("Enjoys chess, long walks, and analytical engines. Favorite show: The Expanse."),
    );

    let sessions = Arc::new(SessionManager::new());
    let session = sessions
        .create("demo-app", "ada", None, initial_state, CreateMode::Strict)
        .await?;
    println!("Created session {}", session.key());

    let runner = Runner::new("demo-app", Agent::Leaf(agent), sessions.clone());
    let mut stream = runner
        .run("ada", &session.key().session_id, "What is my favorite show?")
        .await?;

    while let Some(event) = stream.next_event().await {
        if event.is_final_response() {
            println!("Final response: {}", event.content().unwrap_or_default());
        }
    }

    println!("=== Final session state ===");
    let state = session.state().snapshot().await;
    for (key, value) in state.iter() {
        println!("{key}: {value}");
    }

    Ok(())
}
