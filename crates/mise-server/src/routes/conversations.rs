//! Conversation and message routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use mise_store::{ChatMessage, Conversation, ConversationStore, MessageStore, NewMessage, Role};
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/conversations", post(create_conversation))
        .route("/conversations/{id}", get(get_conversation))
        .route(
            "/conversations/{id}/messages",
            get(list_messages).post(append_message),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateConversationRequest {
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct AppendMessageRequest {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
}

fn find_conversation(state: &AppState, id: &str) -> Result<Conversation, ApiError> {
    state
        .store
        .get_conversation(id)?
        .ok_or_else(|| ApiError::not_found(format!("conversation {}", id)))
}

/// POST /api/conversations
async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::validation("userId is required"));
    }
    let conversation = state.store.create_conversation(req.user_id.trim())?;
    debug!(
        "Created conversation {} for {}",
        conversation.conversation_id, conversation.user_id
    );
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /api/conversations/{id}
async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    find_conversation(&state, &id).map(Json)
}

/// GET /api/conversations/{id}/messages
async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    find_conversation(&state, &id)?;
    Ok(Json(state.store.list_messages(&id)?))
}

/// POST /api/conversations/{id}/messages
async fn append_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let role = Role::parse(&req.role)
        .ok_or_else(|| ApiError::validation("role must be 'user' or 'assistant'"))?;
    if req.content.trim().is_empty() {
        return Err(ApiError::validation("content is required"));
    }

    let message = state.store.append_message(NewMessage {
        conversation_id: id,
        role,
        content: req.content,
    })?;
    Ok((StatusCode::CREATED, Json(message)))
}
