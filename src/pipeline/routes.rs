//! HTTP endpoints for chat turns.
//!
//! `POST /api/chat` answers with JSON for short-circuit and error paths, or
//! with a server-sent event stream: `token` events carrying raw model text,
//! then one `final` event with the enriched payload (or one `error` event if
//! the model stream broke).

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::StreamExt;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::error;

use super::orchestrator::{TurnOrchestrator, TurnOutcome};
use super::stream::{STREAM_INTERRUPTED_MESSAGE, StreamEvent};
use super::types::{ReplyStatus, TurnReply, TurnRequest};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
}

/// Build the Axum router with the chat and health routes.
pub fn chat_routes(orchestrator: Arc<TurnOrchestrator>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "career-coach"
    }))
}

// ── Chat ────────────────────────────────────────────────────────────────

async fn chat(State(state): State<AppState>, Json(request): Json<TurnRequest>) -> Response {
    match state.orchestrator.run_turn(request).await {
        TurnOutcome::Reply(reply) => reply_response(reply),
        TurnOutcome::Streaming(stream) => {
            let events = stream
                .into_stream()
                .map(|event| Ok::<_, Infallible>(sse_event(event)));
            Sse::new(events)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
    }
}

fn reply_response(reply: TurnReply) -> Response {
    let status = match reply.status {
        ReplyStatus::Ok => StatusCode::OK,
        ReplyStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(reply.body)).into_response()
}

fn sse_event(event: StreamEvent) -> Event {
    match event {
        // SSE data lines cannot carry carriage returns.
        StreamEvent::Token(text) => Event::default().event("token").data(text.replace('\r', "")),
        StreamEvent::Final(payload) => match serde_json::to_string(&payload) {
            Ok(json) => Event::default().event("final").data(json),
            Err(e) => {
                error!(error = %e, "Failed to serialize final payload");
                Event::default()
                    .event("error")
                    .data(STREAM_INTERRUPTED_MESSAGE)
            }
        },
        StreamEvent::Failed(message) => Event::default().event("error").data(message),
    }
}
