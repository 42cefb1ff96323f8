//! cs-api: HTTP API for the customer support agent
//!
//! Exposes the chat endpoint, the chat widget page and session
//! management routes. Built with axum for async HTTP handling.

pub mod error;
pub mod handlers;
pub mod page;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use page::ChatPage;
pub use server::{AppState, build_app, start_server};
