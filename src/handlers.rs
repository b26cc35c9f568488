// src/handlers.rs

use crate::chat::{ChatTurn, ServiceStatus};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// Chat endpoint. Always answers 200 with a reply string: expected failure
/// modes come back as pre-formatted user-facing text, not error responses.
#[instrument(skip(state, request), fields(message_len = request.message.len()))]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let reply = state
        .chat
        .get_chat_response(&request.message, &request.history)
        .await;
    Json(ChatResponse { reply })
}

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Pool and throttle snapshot for operators.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<ServiceStatus> {
    Json(state.chat.status().await)
}

/// Clears every key's failure mark ahead of the daily reset, e.g. after
/// topping up quota on an existing key.
pub async fn reset_keys_handler(
    State(state): State<Arc<AppState>>,
) -> crate::error::Result<Json<ServiceStatus>> {
    state.chat.reset_failed_keys().await?;
    Ok(Json(state.chat.status().await))
}
