mod app;
mod config;
mod error;
mod extract;
mod handlers;
mod limit;
mod metrics;
mod middleware;
mod model;
mod state;

use crate::app::App;
use crate::config::{to_std, Config, LoggingConfig};
use crate::limit::{AdmissionConfig, AdmissionController};
use crate::state::AppState;
use clap::Parser;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zipline_cache::RedisCache;
use zipline_service::{LinkService, Reaper, ServiceConfig};
use zipline_storage::PostgresStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config.logging);

    info!(port = config.server.port, "starting zipline gateway");

    // Durable store.
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_open_conns)
        .min_connections(config.database.max_idle_conns)
        .max_lifetime(to_std(config.database.conn_max_lifetime))
        .connect(&config.database.url())
        .await?;
    let store = PostgresStore::new(pool);
    store.ensure_schema().await?;
    info!(host = %config.database.host, "connected to postgres");

    // Cache tier. The ConnectionManager reconnects on its own, so a
    // Redis outage degrades lookups instead of failing startup-only.
    let client = redis::Client::open(config.redis.url())?;
    let manager_config =
        ConnectionManagerConfig::new().set_number_of_retries(config.redis.max_retries);
    let conn = ConnectionManager::new_with_config(client, manager_config).await?;
    let cache = RedisCache::new(
        conn,
        to_std(config.redis.ttl),
        to_std(config.redis.negative_ttl),
    );
    info!(host = %config.redis.host, "connected to redis");

    let service = Arc::new(LinkService::new(
        store,
        cache,
        ServiceConfig::builder()
            .base_url(config.resolved_base_url())
            .code_length(config.code_length)
            .max_url_length(config.max_url_length)
            .allowed_hosts(config.security.allowed_hosts.clone())
            .blocked_hosts(config.security.blocked_domains.clone())
            .build(),
    ));

    let limiter = Arc::new(AdmissionController::new(
        AdmissionConfig::builder()
            .global_rps(config.rate_limit.global_rps)
            .per_client_rps(config.rate_limit.per_ip_rps)
            .burst_size(config.rate_limit.burst_size)
            .build(),
    ));

    // Background tasks stop via the shutdown channel once the server
    // has drained.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = limiter.spawn_sweeper(shutdown_rx.clone());
    let reaper = Reaper::new(to_std(config.reap_interval)).spawn(Arc::clone(&service), shutdown_rx);

    let state = AppState::builder()
        .service(Arc::clone(&service))
        .limiter(limiter)
        .build();
    let router = App::router(state, &config);

    let listener =
        tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.server.port))).await?;
    info!(listen_addr = %listener.local_addr()?, "gateway listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(to_std(config.server.shutdown_timeout)))
    .await?;

    info!("server drained, stopping background tasks");
    let _ = shutdown_tx.send(true);
    let _ = reaper.await;
    let _ = sweeper.await;

    service.store().pool().close().await;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolves when a termination signal arrives. Axum then stops
/// accepting and lets in-flight requests run to completion; the
/// per-request timeout layer keeps that drain window bounded.
async fn shutdown_signal(drain_timeout: std::time::Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!(timeout_secs = drain_timeout.as_secs(), "termination signal received, draining");
}
