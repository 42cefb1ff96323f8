//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, http::HeaderValue};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use cs_core::{ApiConfig, ChatService};

use crate::page::ChatPage;
use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub chat_page: ChatPage,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>, chat_page: ChatPage) -> Self {
        Self { chat, chat_page }
    }
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = allowed_origins else {
        return CorsLayer::permissive();
    };
    // A wildcard cannot be mixed into an origin list
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router with middleware
pub fn build_app(state: AppState, config: &ApiConfig) -> Router {
    Router::new()
        .merge(routes())
        .layer(cors_layer(config.allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server and run until `shutdown` resolves
pub async fn start_server<F>(config: &ApiConfig, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_app(state, config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {}:{}: {}", config.host, config.port, e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
