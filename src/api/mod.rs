//! Axum HTTP surface: `/v1/chat/completions`, `/v1/models`, `/health`.

pub mod handlers;
pub mod stream;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::ServerConfig;
use crate::proxy::ProxyService;
use crate::ratelimit::RateLimiter;

/// Shared state for all handlers.
pub struct AppState {
    pub proxy: Arc<ProxyService>,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(proxy: Arc<ProxyService>, config: &ServerConfig) -> Self {
        Self {
            proxy,
            limiter: RateLimiter::new(
                config.rate_limit,
                config.rate_limit_window,
                config.rate_limit_enabled,
            ),
        }
    }
}

/// Build the application router. The timeout layer caps the whole
/// request budget; it fires before response headers are written, so SSE
/// bodies stream unaffected once started.
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions_handler))
        .route("/v1/models", get(handlers::models_handler))
        .route("/health", get(handlers::health_handler))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve; returns the bound address once listening.
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<AppState>,
    config: &ServerConfig,
) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    let app = router(state, config);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("server error: {}", e);
        }
    });

    Ok(bound)
}
