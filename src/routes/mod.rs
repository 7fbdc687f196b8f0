//! API routes
//!
//! A thin HTTP adapter over [`InstanceHost`] and the session store.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::core::{BufferState, InstanceHost, QueryAnswer};
use crate::storage::{LongTermStore, SessionRecord, SessionStore, StoreError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub host: Arc<InstanceHost>,
    pub long_term: Arc<dyn LongTermStore>,
    pub sessions: Arc<dyn SessionStore>,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionMessageRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SentimentRequest {
    pub sentiment: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn submit_input(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Json(request): Json<TextRequest>,
) -> ApiResult<StatusCode> {
    state
        .host
        .submit_input(&instance_id, &request.text)
        .await
        .map_err(internal)?;
    Ok(StatusCode::ACCEPTED)
}

async fn buffer_state(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<BufferState>> {
    let buffer = state
        .host
        .buffer_state(&instance_id)
        .await
        .map_err(internal)?;
    Ok(Json(buffer))
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> Json<QueryAnswer> {
    Json(state.host.query(&request.text).await)
}

async fn append_session(
    State(state): State<AppState>,
    Path(identity): Path<String>,
    Json(request): Json<SessionMessageRequest>,
) -> ApiResult<StatusCode> {
    state
        .sessions
        .append(&identity, &request.message)
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_session(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> ApiResult<Json<SessionRecord>> {
    let messages = state.sessions.get(&identity).await.map_err(internal)?;
    Ok(Json(SessionRecord { identity, messages }))
}

async fn tag_sentiment(
    State(state): State<AppState>,
    Path(row_key): Path<String>,
    Json(request): Json<SentimentRequest>,
) -> ApiResult<StatusCode> {
    match state
        .long_term
        .tag_sentiment(&row_key, &request.sentiment)
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(StoreError::NotFound(key)) => {
            Err((StatusCode::NOT_FOUND, format!("No memory with key {}", key)))
        }
        Err(e) => Err(internal(e)),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/instances/:instance_id/inputs", post(submit_input))
        .route("/v1/instances/:instance_id/buffer", get(buffer_state))
        .route("/v1/query", post(query))
        .route("/v1/sessions/:identity", get(get_session))
        .route("/v1/sessions/:identity/messages", post(append_session))
        .route("/v1/memory/:row_key/sentiment", post(tag_sentiment))
}
