//! mentiond - mention ledger sidecar for forum hosts
//!
//! Tracks @mentions across discussions and comments, keeps per-user counters
//! consistent with the ledger, and serves paginated, permission-filtered
//! profile feeds over a REST API.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tracing::info;

use mentiond::auth;
use mentiond::config::ServerConfig;
use mentiond::handlers::{self, MentionService};
use mentiond::metrics;
use mentiond::middleware;

// Shutdown timeouts
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30; // Max time to drain requests
const DATABASE_FLUSH_TIMEOUT_SECS: u64 = 10; // Max time to flush RocksDB

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mentiond=info,tower_http=warn".into()),
        )
        .init();

    metrics::register_metrics().expect("Failed to register metrics");
    info!("Metrics registered at /metrics");

    info!("Starting mentiond...");

    let server_config = ServerConfig::from_env();
    server_config.log();

    let service = Arc::new(MentionService::new(server_config.clone())?);

    // Keep a reference for shutdown cleanup (clone BEFORE moving into router)
    let service_for_shutdown = Arc::clone(&service);

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(server_config.rate_limit_per_second)
        .burst_size(server_config.rate_limit_burst)
        .finish()
        .expect("Failed to build governor rate limiter configuration");

    info!(
        "Rate limiting enabled: {} req/sec, burst of {}",
        server_config.rate_limit_per_second, server_config.rate_limit_burst
    );

    let cors = server_config.cors.to_layer();

    // Public routes stay unauthenticated and unthrottled (probes, scraping)
    let public_routes = handlers::build_public_routes(service.clone());

    let protected_routes = handlers::build_protected_routes(service.clone())
        .layer(axum::middleware::from_fn(auth::auth_middleware))
        .layer(GovernorLayer::new(governor_conf));

    // Backfill and repair need the admin key
    let admin_routes = handlers::build_admin_routes(service.clone())
        .layer(axum::middleware::from_fn(auth::admin_middleware));

    let max_concurrent = server_config.max_concurrent_requests;
    info!("Concurrency limiting enabled: max_concurrent={max_concurrent}");

    let app = axum::Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutdown signal received, flushing databases...");

    let cleanup_future = async {
        let flush_future = async { service_for_shutdown.flush_all_databases() };

        match tokio::time::timeout(
            std::time::Duration::from_secs(DATABASE_FLUSH_TIMEOUT_SECS),
            flush_future,
        )
        .await
        {
            Ok(Ok(())) => info!("Databases flushed successfully"),
            Ok(Err(e)) => tracing::error!("Failed to flush databases: {e}"),
            Err(_) => tracing::error!(
                "Database flush timed out after {}s",
                DATABASE_FLUSH_TIMEOUT_SECS
            ),
        }
    };

    match tokio::time::timeout(
        std::time::Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        cleanup_future,
    )
    .await
    {
        Ok(()) => {
            info!("Server shutdown complete");
        }
        Err(_) => {
            tracing::error!(
                "Graceful shutdown timed out after {}s, forcing exit",
                GRACEFUL_SHUTDOWN_TIMEOUT_SECS
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Handle graceful shutdown on ctrl-c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
