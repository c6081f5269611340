//! Agent introspection endpoints.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use chrono::Utc;

use crate::state::AppState;

/// GET /api/v1/agent/tools — the schemas the model sees.
pub async fn tools(State(state): State<AppState>) -> impl IntoResponse {
    let definitions = state.registry.definitions();
    Json(serde_json::json!({
        "tools": definitions,
        "count": definitions.len(),
    }))
}

/// GET /api/v1/agent/health — liveness plus a configuration snapshot.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "strategy": state.strategy_name,
        "storageMode": state.config.conversation.storage_mode,
        "providers": state.providers,
        "tools": state.registry.len(),
        "maxIterations": state.config.agent_loop.max_iterations,
    }))
}

/// GET /ping — bare liveness.
pub async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now(),
    }))
}
