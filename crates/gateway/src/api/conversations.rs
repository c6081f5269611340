//! Conversation endpoints — creation, inspection, and the message paths
//! (streaming SSE and blocking).

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use rl_domain::conversation::ConversationStatus;

use crate::api::error::ApiError;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub caller_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub initial_message: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub caller_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/chat/conversations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateConversationRequest>,
) -> Result<Response, ApiError> {
    if body.caller_id.trim().is_empty() {
        return Err(ApiError::bad_request("callerId is required"));
    }

    let mut conversation = state
        .context
        .create_conversation(
            body.caller_id.trim(),
            body.user_id,
            body.account_id,
            body.initial_message,
        )
        .await
        .map_err(|e| ApiError::from_domain(&e))?;

    if let Some(metadata) = body.metadata {
        conversation.metadata = Some(metadata.to_string());
        state
            .context
            .save_conversation(&conversation)
            .await
            .map_err(|e| ApiError::from_domain(&e))?;
    }

    tracing::info!(
        conversation_id = %conversation.conversation_id,
        caller_id = %conversation.caller_id,
        "conversation created"
    );
    Ok(Json(conversation).into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/v1/chat/conversations/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let conversation = state
        .context
        .conversation(&id)
        .await
        .map_err(|e| ApiError::from_domain(&e).with_path(format!("/api/v1/chat/conversations/{id}")))?;
    Ok(Json(conversation).into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/v1/chat/conversations?callerId=…&limit=…
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let caller_id = query
        .caller_id
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("callerId query parameter is required"))?;

    let limit = query.limit.unwrap_or(10).clamp(1, 100) as usize;

    let conversations = state
        .context
        .recent_by_caller(caller_id, limit)
        .await
        .map_err(|e| ApiError::from_domain(&e))?;

    Ok(Json(serde_json::json!({
        "conversations": conversations,
        "count": conversations.len(),
    }))
    .into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /api/v1/chat/conversations/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let mut conversation = state
        .context
        .conversation(&id)
        .await
        .map_err(|e| ApiError::from_domain(&e))?;

    conversation.status = ConversationStatus::Deleted;
    state
        .context
        .save_conversation(&conversation)
        .await
        .map_err(|e| ApiError::from_domain(&e))?;

    tracing::info!(conversation_id = %id, "conversation deleted");
    Ok(Json(serde_json::json!({
        "conversationId": id,
        "status": ConversationStatus::Deleted,
    }))
    .into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/v1/chat/conversations/:id/messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let messages = state
        .context
        .history(&id)
        .await
        .map_err(|e| ApiError::from_domain(&e))?;

    Ok(Json(serde_json::json!({
        "conversationId": id,
        "messages": messages,
        "count": messages.len(),
    }))
    .into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/chat/conversations/:id/messages/stream  (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn send_message_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Result<Response, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be blank"));
    }

    // 404 before the stream starts — inside it we could only signal via
    // an Error event.
    state
        .context
        .conversation(&id)
        .await
        .map_err(|e| ApiError::from_domain(&e))?;

    let permit = state
        .turn_locks
        .try_acquire(&id)
        .ok_or_else(|| ApiError::busy("a turn is already in progress for this conversation"))?;

    let mut rx =
        state
            .orchestrator
            .process_message_stream(id, body.message, Some(permit));

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok::<_, std::convert::Infallible>(
                Event::default().event(event.event_name()).data(data),
            );
        }
    };

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/chat/conversations/:id/messages  (blocking)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn send_message_sync(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Result<Response, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be blank"));
    }

    state
        .context
        .conversation(&id)
        .await
        .map_err(|e| ApiError::from_domain(&e))?;

    let _permit = state
        .turn_locks
        .try_acquire(&id)
        .ok_or_else(|| ApiError::busy("a turn is already in progress for this conversation"))?;

    let result = state
        .orchestrator
        .process_message_sync(&id, &body.message)
        .await
        .map_err(|e| ApiError::from_domain(&e))?;

    Ok(Json(result).into_response())
}
