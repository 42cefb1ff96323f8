//! HTTP API handlers
//!
//! Thin adapters between the HTTP surface and the chat service.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::Html,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cs_core::Turn;

use crate::error::{ApiError, Result};
use crate::server::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Chat request payload
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Caller-chosen conversation id
    pub session_id: String,
    /// User message
    pub user_input: String,
}

/// Chat response payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub session_id: String,
}

/// Service status payload
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Session info response
#[derive(Debug, Serialize)]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub message_count: usize,
    pub created_at: String,
    pub updated_at: String,
    pub turns: Vec<Turn>,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Availability message
pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "Customer Support AI Agent running successfully",
    })
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Chat widget page
pub async fn chat_page(State(state): State<AppState>) -> Result<Html<String>> {
    let html = state.chat_page.render().await?;
    Ok(Html(html))
}

/// Chat endpoint - run one conversation turn
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    debug!(
        "Chat request: session={} input_len={}",
        req.session_id,
        req.user_input.len()
    );

    let reply = state.chat.handle_turn(&req.session_id, &req.user_input).await?;

    Ok(Json(ChatResponse {
        reply: reply.reply,
        session_id: reply.session_id,
    }))
}

/// Get session info
pub async fn session_info(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfoResponse>> {
    debug!("Session info request: {}", session_id);

    let session = state
        .chat
        .store()
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(session_id.clone()))?;

    Ok(Json(SessionInfoResponse {
        session_id: session.id,
        message_count: session.turns.len(),
        created_at: session.created_at.to_rfc3339(),
        updated_at: session.updated_at.to_rfc3339(),
        turns: session.turns,
    }))
}

/// Clear session
pub async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode> {
    if !state.chat.store().remove(&session_id) {
        return Err(ApiError::SessionNotFound(session_id));
    }

    info!("Cleared session: {}", session_id);
    Ok(StatusCode::NO_CONTENT)
}
