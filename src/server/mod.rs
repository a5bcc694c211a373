//! Server module - HTTP and WebSocket front ends
//!
//! Both routes delegate to the shared [`Agent`]; its conversation gate keeps
//! them from driving the browser at the same time.

mod http;
mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::agent::Agent;
use crate::core::Result;

pub use http::{PromptRequest, PromptResponse};

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
}

impl AppState {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }
}

/// Build the router with both transports
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/get-web-agent-response", post(http::get_web_agent_response))
        .route("/ws", get(ws::websocket_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C, then close the browser
pub async fn serve(agent: Arc<Agent>) -> Result<()> {
    let addr = agent.config().listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "server listening");

    axum::serve(listener, router(AppState::new(Arc::clone(&agent))))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped, closing browser");
    agent.browser().shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
