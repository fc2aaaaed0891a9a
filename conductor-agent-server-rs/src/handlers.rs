use crate::models::{
    CreateSessionRequest, DeleteParams, ErrorResponse, EventPage, RunRequest, SessionResponse,
};
use crate::system;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use conductor_sdk_rs::runner::Runner;
use conductor_sdk_rs::session::{CreateMode, SessionError};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;

pub struct AppState {
    pub runner: Runner,
}

impl AppState {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }
}

fn error_response(status: StatusCode, err: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn session_error_response(err: SessionError) -> Response {
    let status = match err {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::AlreadyExists(_) => StatusCode::CONFLICT,
    };
    error_response(status, err)
}

pub async fn health() -> impl IntoResponse {
    "OK"
}

pub async fn alive() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn server_info() -> impl IntoResponse {
    Json(system::get_server_info().await)
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Response {
    let mode = if payload.overwrite {
        CreateMode::Overwrite
    } else {
        CreateMode::Strict
    };
    let result = state
        .runner
        .sessions()
        .create(
            state.runner.app_name(),
            &payload.user_id,
            payload.session_id.as_deref(),
            payload.state.into(),
            mode,
        )
        .await;

    match result {
        Ok(session) => {
            let snapshot = session.state().snapshot().await;
            (
                StatusCode::CREATED,
                Json(SessionResponse::from_session(&session, snapshot)),
            )
                .into_response()
        }
        Err(err) => session_error_response(err),
    }
}

pub async fn get_session(
    Path((user_id, session_id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state
        .runner
        .sessions()
        .get(state.runner.app_name(), &user_id, &session_id)
        .await
    {
        Ok(session) => {
            let snapshot = session.state().snapshot().await;
            Json(SessionResponse::from_session(&session, snapshot)).into_response()
        }
        Err(err) => session_error_response(err),
    }
}

pub async fn delete_session(
    Path((user_id, session_id)): Path<(String, String)>,
    Query(params): Query<DeleteParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state
        .runner
        .sessions()
        .delete(
            state.runner.app_name(),
            &user_id,
            &session_id,
            params.strict,
        )
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => session_error_response(err),
    }
}

pub async fn list_events(
    Path((user_id, session_id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state
        .runner
        .sessions()
        .get(state.runner.app_name(), &user_id, &session_id)
        .await
    {
        Ok(session) => Json(EventPage {
            items: session.events().list().await,
        })
        .into_response(),
        Err(err) => session_error_response(err),
    }
}

/// Streams the run's events as NDJSON, one event per line, ending with
/// the run's terminal event.
pub async fn run_session(
    Path((user_id, session_id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunRequest>,
) -> Response {
    let stream = match state
        .runner
        .run(&user_id, &session_id, &payload.content)
        .await
    {
        Ok(stream) => stream,
        Err(err) => return session_error_response(err),
    };

    let lines = stream.map(|event| {
        let line = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok::<_, std::convert::Infallible>(format!("{line}\n"))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(lines))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
