use std::sync::Arc;

use veilgate::api::{start_server, AppState};
use veilgate::proxy::ProxyService;
use veilgate::Config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("startup error: {}", err);
            std::process::exit(1);
        }
    };

    let proxy = match ProxyService::from_config(&config) {
        Ok(proxy) => Arc::new(proxy),
        Err(err) => {
            eprintln!("startup error: {}", err);
            std::process::exit(1);
        }
    };

    let addr = match config.server.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("startup error: invalid bind address: {}", err);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new(proxy, &config.server));
    match start_server(addr, state, &config.server).await {
        Ok(bound) => {
            tracing::info!(addr = %bound, upstream = %config.upstream.base_url, "veilgate listening");
        }
        Err(err) => {
            eprintln!("startup error: failed to bind listener: {}", err);
            std::process::exit(1);
        }
    }

    // Serve until interrupted.
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!("failed to listen for shutdown signal: {}", err),
    }
}
