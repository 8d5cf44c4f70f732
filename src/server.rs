// Copyright 2026 The Tollgate Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface.
//
// Responsibilities:
// - POST /api/chat: start or continue a conversation turn (SSE out)
// - POST /api/continue: resume a turn paused for OAuth consent (SSE out)
// - GET /: health
// - CORS for the configured browser origins
// - Client usage errors (unknown conversation, missing continuation
//   token) rejected before any upstream call

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::conversation::ConversationStore;
use crate::turn::{TurnInput, TurnRunner};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub conversation_id: String,
    pub user_message: String,
}

/// Body of `POST /api/continue`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequest {
    pub conversation_id: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Client usage errors. No stream is opened for these.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("no conversation found for conversationId={0}")]
    UnknownConversation(String),

    #[error("no previous response id stored; cannot continue")]
    MissingContinuation,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownConversation(_) => StatusCode::NOT_FOUND,
            ApiError::MissingContinuation => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<TurnRunner>,
    pub conversations: Arc<dyn ConversationStore>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Health endpoint: GET / -> service metadata.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tollgate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Start a new conversation turn, or continue an existing conversation.
///
/// A continuation token stored by a prior turn is included automatically
/// so the agent keeps context across turns.
pub async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    sse_response(
        state
            .runner
            .run(req.conversation_id, TurnInput::Message(req.user_message)),
    )
}

/// Resume a conversation paused for OAuth consent.
///
/// Fails without opening a stream when the conversation was never seen or
/// has no stored continuation token.
pub async fn resume(
    State(state): State<AppState>,
    Json(req): Json<ContinueRequest>,
) -> Result<Response, ApiError> {
    let stored = state
        .conversations
        .get(&req.conversation_id)
        .ok_or_else(|| ApiError::UnknownConversation(req.conversation_id.clone()))?;
    if stored.previous_response_id.is_none() {
        return Err(ApiError::MissingContinuation);
    }

    tracing::info!(conversation_id = %req.conversation_id, "resuming after consent");
    Ok(sse_response(
        state.runner.run(req.conversation_id, TurnInput::Resume),
    ))
}

/// Wrap a turn's byte stream as an SSE response with buffering disabled.
fn sse_response(stream: impl Stream<Item = Bytes> + Send + 'static) -> Response {
    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        // Disable proxy buffering (nginx) between the relay and the browser.
        .header("x-accel-buffering", "no")
        .body(body)
        .expect("static response headers are valid")
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router. Collaborators are injected; no side effects.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/", get(health))
        .route("/api/chat", post(chat))
        .route("/api/continue", post(resume))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
