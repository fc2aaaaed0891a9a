use conductor_sdk_rs::agent::{Agent, LeafAgent, SequentialAgent};
use conductor_sdk_rs::oracle::{LlmOracle, OracleConfig};
use conductor_sdk_rs::runner::Runner;
use conductor_sdk_rs::session::{CreateMode, SessionManager};
use conductor_sdk_rs::state::State;
use std::sync::Arc;

/// Three-stage support-ticket pipeline. Each stage writes its conclusion
/// into session state, so later stages build on earlier ones.
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

    let classifier = LeafAgent::new("classifier", oracle.clone())
        .with_instructions(
            "Classify the support ticket as one of: billing, outage, how-to. \
             Reply with the category only.",
        )
        .with_output_key("category");

    let prioritizer = LeafAgent::new("prioritizer", oracle.clone())
        .with_instructions(
            "Given the ticket and the category in session state, rate the \
             priority P1-P4. Reply with the rating only.",
        )
        .with_output_key("priority");

    let responder = LeafAgent::new("responder", oracle).with_instructions(
        "Draft a short reply to the ticket, consistent with the category and \
         priority recorded in session state.",
    );

    let pipeline = SequentialAgent::new(
        "ticket_pipeline",
        vec![
            Agent::Leaf(classifier),
            Agent::Leaf(prioritizer),
            Agent::Leaf(responder),
        ],
    );

    let sessions = Arc::new(SessionManager::new());
    let session = sessions
        .create("demo-app", "support", None, State::new(), CreateMode::Strict)
        .await?;

    let runner = Runner::new("demo-app", Agent::Sequential(pipeline), sessions);
    let mut stream = runner
        .run(
            "support",
            &session.key().session_id,
            "Our dashboard has been down for two hours and we are losing orders.",
        )
        .await?;

    while let Some(event) = stream.next_event().await {
        if let Some(content) = event.content() {
            println!("[{}] {}", event.author, content);
        }
    }

    println!("=== Pipeline state ===");
    let state = session.state().snapshot().await;
    for (key, value) in state.iter() {
        println!("{key}: {value}");
    }

    Ok(())
}
