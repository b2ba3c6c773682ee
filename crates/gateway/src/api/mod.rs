pub mod chat;
pub mod health;
pub mod sessions;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health::health))
        // Chat (core runtime)
        .route("/v1/chat", post(chat::chat))
        .route("/v1/chat/stream", post(chat::chat_stream))
        // Sessions
        .route("/v1/sessions", get(sessions::list_sessions))
        .route(
            "/v1/sessions/:id",
            get(sessions::get_session).delete(sessions::end_session),
        )
        .route("/v1/sessions/:id/stop", post(sessions::stop_session))
}
