// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// HTTP surface of the coordination service.
//
// Business outcomes (conflicts, staleness) travel inside 200 responses
// via the orchestration command; only validation, authentication, quota
// and infrastructure failures produce non-200 statuses.

use crate::application::coordination::{
    CoordinationError, CoordinationService, PostStatusRequest, ReportedStatus,
};
use crate::application::locks::LockService;
use crate::domain::repository::RepoRef;
use crate::infrastructure::event_bus::EventBus;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

pub const USER_ID_HEADER: &str = "x-concord-user-id";
pub const USER_NAME_HEADER: &str = "x-concord-user-name";
pub const SWEEPER_SECRET_HEADER: &str = "x-concord-sweeper-secret";

pub struct AppState {
    pub coordination: Arc<CoordinationService>,
    pub locks: Arc<LockService>,
    pub events: Arc<EventBus>,
    pub sweeper_secret: Option<String>,
    pub start_time: Instant,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status/check", post(check_status))
        .route("/api/v1/status", post(post_status))
        .route("/api/v1/graph", get(get_graph))
        .route("/api/v1/locks/release-all", post(release_all))
        .route("/api/v1/internal/cleanup", post(cleanup_stale_locks))
        .route("/api/v1/events", get(stream_events))
        .with_state(state)
}

/// Error shape shared by every handler.
pub enum ApiError {
    Validation(String),
    Unauthorized,
    RateLimited { reset_at: Option<i64> },
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response(),
            ApiError::RateLimited { reset_at } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "remote quota exhausted",
                    "retry_at": reset_at,
                })),
            )
                .into_response(),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response(),
        }
    }
}

impl From<CoordinationError> for ApiError {
    fn from(e: CoordinationError) -> Self {
        match e {
            CoordinationError::Validation(msg) => ApiError::Validation(msg),
            CoordinationError::RateLimited { reset_at } => ApiError::RateLimited { reset_at },
            CoordinationError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

fn parse_repo(repo_url: &str) -> Result<RepoRef, ApiError> {
    if repo_url.is_empty() {
        return Err(ApiError::Validation("repo_url is required".into()));
    }
    RepoRef::parse(repo_url).map_err(|e| ApiError::Validation(e.to_string()))
}

fn identity(headers: &HeaderMap) -> Result<(String, String), ApiError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{USER_ID_HEADER} header is required")))?
        .to_string();
    let user_name = headers
        .get(USER_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(user_id.as_str())
        .to_string();
    Ok((user_id, user_name))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "concord",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

#[derive(Deserialize)]
struct CheckStatusBody {
    repo_url: String,
    branch: String,
    #[serde(default)]
    file_paths: Vec<String>,
    #[serde(default)]
    agent_head: String,
}

async fn check_status(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckStatusBody>,
) -> Result<Response, ApiError> {
    let repo = parse_repo(&body.repo_url)?;
    let report = state
        .coordination
        .check_status(&repo, &body.branch, &body.file_paths, &body.agent_head)
        .await?;
    Ok(Json(report).into_response())
}

#[derive(Deserialize)]
struct PostStatusBody {
    repo_url: String,
    branch: String,
    #[serde(default)]
    file_paths: Vec<String>,
    status: String,
    #[serde(default)]
    message: String,
    agent_head: Option<String>,
    new_repo_head: Option<String>,
}

async fn post_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PostStatusBody>,
) -> Result<Response, ApiError> {
    let repo = parse_repo(&body.repo_url)?;
    let (user_id, user_name) = identity(&headers)?;
    let outcome = state
        .coordination
        .post_status(PostStatusRequest {
            repo,
            branch: body.branch,
            file_paths: body.file_paths,
            status: ReportedStatus::parse(&body.status),
            message: body.message,
            agent_head: body.agent_head,
            new_repo_head: body.new_repo_head,
            user_id,
            user_name,
        })
        .await?;
    Ok(Json(outcome).into_response())
}

#[derive(Deserialize)]
struct GraphQuery {
    repo_url: String,
    branch: String,
    #[serde(default)]
    regenerate: bool,
}

async fn get_graph(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GraphQuery>,
) -> Result<Response, ApiError> {
    let repo = parse_repo(&query.repo_url)?;
    if query.branch.is_empty() {
        return Err(ApiError::Validation("branch is required".into()));
    }
    let graph = state
        .coordination
        .get_graph(&repo, &query.branch, query.regenerate)
        .await?;
    Ok(Json(graph).into_response())
}

#[derive(Deserialize)]
struct ReleaseAllBody {
    repo_url: String,
    branch: String,
}

async fn release_all(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReleaseAllBody>,
) -> Result<Response, ApiError> {
    let repo = parse_repo(&body.repo_url)?;
    if body.branch.is_empty() {
        return Err(ApiError::Validation("branch is required".into()));
    }
    let released = state.coordination.release_all(&repo, &body.branch).await?;
    Ok(Json(json!({ "success": true, "released": released })).into_response())
}

/// Scheduler-facing cleanup; the scheduler is untrusted and must present
/// the shared secret.
async fn cleanup_stale_locks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let presented = headers
        .get(SWEEPER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    match (&state.sweeper_secret, presented) {
        (Some(expected), Some(given)) if expected == given => {}
        _ => return Err(ApiError::Unauthorized),
    }
    let cleaned = state
        .locks
        .sweep()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({
        "success": true,
        "cleaned": cleaned,
        "timestamp": Utc::now().timestamp_millis(),
    }))
    .into_response())
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = BroadcastStream::new(state.events.subscribe_raw()).filter_map(|item| {
        // lagged receivers just skip dropped events
        item.ok().map(|event| Event::default().json_data(&event))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
