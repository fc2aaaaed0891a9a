mod handlers;
mod models;
mod system;

use axum::{
    routing::{get, post},
    Router,
};
use conductor_sdk_rs::agent::{Agent, LeafAgent};
use conductor_sdk_rs::oracle::{LlmOracle, OracleConfig};
use conductor_sdk_rs::runner::Runner;
use conductor_sdk_rs::session::SessionManager;
use conductor_sdk_rs::tools::CurrentTimeTool;
use handlers::AppState;
use std::env;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Assembles the root agent served by this process: an LLM-backed
/// assistant with the built-in clock capability. Model and key come from
/// the environment.
fn build_root_agent() -> Agent {
    let model = env::var("CONDUCTOR_MODEL").unwrap_or_else(|_| "gpt-5-nano".to_string());
    let api_key = env::var("OPENAI_API_KEY")
        .or_else(|_| env::var("ANTHROPIC_API_KEY"))
        .ok();
    let oracle = Arc::new(LlmOracle::new(OracleConfig {
        model,
        api_key,
        reasoning_effort: Some("minimal".to_string()),
    }));

    Agent::Leaf(
        LeafAgent::new("assistant", oracle)
            .with_description("General-purpose assistant")
            .with_instructions("You are a helpful assistant.")
            .with_tool(Arc::new(CurrentTimeTool)),
    )
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    conductor_sdk_rs::logger::init_logging();

    let app_name = env::var("CONDUCTOR_APP").unwrap_or_else(|_| "conductor".to_string());
    let runner = Runner::new(&app_name, build_root_agent(), Arc::new(SessionManager::new()));
    let state = Arc::new(AppState::new(runner));

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/alive", get(handlers::alive))
        .route("/server_info", get(handlers::server_info))
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/{user_id}/{session_id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route(
            "/api/sessions/{user_id}/{session_id}/events",
            get(handlers::list_events),
        )
        .route(
            "/api/sessions/{user_id}/{session_id}/run",
            post(handlers::run_session),
        )
        .with_state(state);

    let listener = match TcpListener::bind("0.0.0.0:3000").await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind 0.0.0.0:3000: {err}");
            return;
        }
    };
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on {addr}");
    }
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("server error: {err}");
    }
}
