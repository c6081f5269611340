//! HTTP surface, base path `/api/v1`.

pub mod agent;
pub mod conversations;
pub mod error;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Conversations
        .route(
            "/api/v1/chat/conversations",
            post(conversations::create).get(conversations::list),
        )
        .route(
            "/api/v1/chat/conversations/:id",
            get(conversations::get).delete(conversations::remove),
        )
        .route(
            "/api/v1/chat/conversations/:id/messages",
            post(conversations::send_message_sync).get(conversations::history),
        )
        .route(
            "/api/v1/chat/conversations/:id/messages/stream",
            post(conversations::send_message_stream),
        )
        // Agent introspection
        .route("/api/v1/agent/tools", get(agent::tools))
        .route("/api/v1/agent/health", get(agent::health))
        .route("/api/v1/ping", get(agent::ping))
        .route("/ping", get(agent::ping))
        .with_state(state)
}
