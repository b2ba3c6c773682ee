//! Chat API endpoints, the primary interface for running turns.
//!
//! - `POST /v1/chat`        non-streaming: returns the turn result
//! - `POST /v1/chat/stream` SSE streaming: deltas, then the result

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use serde::Deserialize;

use crate::runtime::{TurnError, TurnEvent, TurnInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Session to continue. Absent starts a new session.
    #[serde(default)]
    pub session_id: Option<String>,
    /// User message text.
    pub message: String,
}

impl From<ChatRequest> for TurnInput {
    fn from(body: ChatRequest) -> Self {
        TurnInput {
            session_id: body.session_id,
            message: body.message,
        }
    }
}

/// Map a submit-time failure to an HTTP error response.
fn submit_error(e: TurnError) -> Response {
    let status = match &e {
        TurnError::EmptyMessage => StatusCode::BAD_REQUEST,
        TurnError::Busy(_) => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat (non-streaming)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatRequest>) -> Response {
    let handle = match state.orchestrator.submit(body.into()).await {
        Ok(h) => h,
        Err(e) => return submit_error(e),
    };
    let session_id = handle.session_id.clone();

    for event in handle.collect().await {
        match event {
            TurnEvent::Final { result } => return Json(*result).into_response(),
            TurnEvent::Stopped { content } => {
                return Json(serde_json::json!({
                    "session_id": session_id,
                    "stopped": true,
                    "content": content,
                }))
                .into_response();
            }
            TurnEvent::Error { message } => {
                return (
                    StatusCode::BAD_GATEWAY,
                    Json(serde_json::json!({
                        "session_id": session_id,
                        "error": message,
                    })),
                )
                    .into_response();
            }
            TurnEvent::AssistantDelta { .. } => { /* ignored in non-streaming */ }
        }
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "session_id": session_id,
            "error": "turn ended without a result",
        })),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat/stream (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_stream(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Response {
    let handle = match state.orchestrator.submit(body.into()).await {
        Ok(h) => h,
        Err(e) => return submit_error(e),
    };

    let session_event = Event::default()
        .event("session")
        .data(serde_json::json!({ "session_id": handle.session_id }).to_string());

    Sse::new(make_sse_stream(session_event, handle.events))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Dropping this stream (client disconnect) drops the receiver, which
/// stops the turn without committing it.
fn make_sse_stream(
    first: Event,
    mut rx: tokio::sync::mpsc::Receiver<TurnEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        yield Ok(first);
        while let Some(event) = rx.recv().await {
            let event_type = match &event {
                TurnEvent::AssistantDelta { .. } => "assistant_delta",
                TurnEvent::Final { .. } => "final",
                TurnEvent::Stopped { .. } => "stopped",
                TurnEvent::Error { .. } => "error",
            };
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event_type).data(data));
        }
    }
}
