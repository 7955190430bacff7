use anyhow::Context;
use std::net::SocketAddr;
use tracing::{error, info};

use db_mcp_gateway::api::{create_router, AppState};
use db_mcp_gateway::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so RUST_LOG from .env applies to logging
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        "Cache enabled by default: {} (ttl {}s, max {} entries)",
        config.cache.enabled, config.cache.ttl_secs, config.cache.max_entries
    );
    info!(
        "Pool: {} connections + {} overflow, recycled after {}s",
        config.pool.size, config.pool.max_overflow, config.pool.recycle_secs
    );
    info!("MySQL default target: {:?}", config.mysql);
    info!("PostgreSQL default target: {:?}", config.postgres);

    let app = create_router(AppState::from_config(&config));

    // Start server
    let addr: SocketAddr = config
        .server_address()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server_address()))?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {}", e);
            e
        })?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
