//! Route definitions
//!
//! Defines all HTTP API endpoints.

use axum::{
    Router,
    routing::get,
};

use crate::handlers::{chat, chat_page, clear_session, health, root, session_info};
use crate::server::AppState;

/// Create the API router
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // Chat widget and chat endpoint share a path
        .route("/chat", get(chat_page).post(chat))
        // Session management
        .route("/api/session/{session_id}", get(session_info).delete(clear_session))
}
