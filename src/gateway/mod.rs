//! Axum HTTP gateway for the structured schema-generation endpoints and for
//! spawning detached agent sessions. Sits beside the agent core; nothing in
//! the control loop depends on it.
//!
//! Hardening mirrors the agent's other HTTP surfaces:
//! - request body size limit (64KB)
//! - request timeout (30s)

mod handlers;

use crate::config::Config;
use crate::env::remote::RemoteBrowserFactory;
use crate::env::SessionFactory;
use crate::providers;
use anyhow::{Context, Result};
use axum::{routing::post, Router};
use handlers::{handle_chat, handle_define, handle_parse};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB).
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout before a handler is abandoned.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionFactory>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/define", post(handle_define))
        .route("/parse", post(handle_parse))
        .route("/chat", post(handle_chat))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(state)
}

/// Run the HTTP gateway until the process is stopped.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    // Fail fast on a broken provider name instead of at first request.
    providers::create_provider(&config.provider.0, None)
        .context("gateway provider configuration")?;

    let sessions: Arc<dyn SessionFactory> = Arc::new(RemoteBrowserFactory::new(
        &config.browser_url.0,
    )?);
    let state = AppState {
        sessions,
        config: Arc::new(config),
    };

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("invalid gateway bind address")?;
    tracing::info!(%addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind gateway address")?;
    axum::serve(listener, router(state))
        .await
        .context("gateway server error")
}
