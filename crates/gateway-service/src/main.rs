//! API Gateway
//!
//! Entry point for the gateway's authentication edge. This binary mounts no
//! downstream routes: it serves the gateway-owned endpoints and answers
//! authenticated requests for any other path with 404. Deployments that
//! proxy to services embed the library and pass their downstream router to
//! [`routes::build_routes`].

use axum::Router;
use gateway_service::config::Config;
use gateway_service::observability::metrics::init_metrics_recorder;
use gateway_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_service=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    info!("Starting API Gateway");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!(target: "gw.config", "Failed to load configuration: {}", e);
        e
    })?;

    info!(
        target: "gw.config",
        bind_address = %config.bind_address,
        key_service_base_url = %config.key_service_base_url,
        key_cache_ttl_ms = config.key_cache_ttl.as_millis() as u64,
        key_fetch_timeout_ms = config.key_fetch_timeout.as_millis() as u64,
        allow_list_paths = config.allow_list_paths.len(),
        stale_key_policy = ?config.stale_key_policy,
        jwt_clock_skew_seconds = config.jwt_clock_skew.as_secs(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let bind_address = config.bind_address.clone();
    let drain_period = config.drain_period;

    let state = Arc::new(AppState::new(config).map_err(|e| {
        error!("Failed to create key source: {}", e);
        e
    })?);

    // Warm the key cache; failure is not fatal since the filter fetches on demand
    match state.key_provider.get_key().await {
        Ok(key) => info!(target: "gw.auth.keys", algorithm = %key.algorithm(), "Verification key loaded"),
        Err(e) => warn!(target: "gw.auth.keys", error = %e, "Initial key fetch failed, will retry on demand"),
    }

    // No downstream services here; see the module docs
    let app = routes::build_routes(state, Router::new(), metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("API Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_period))
    .await?;

    info!("API Gateway shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_period: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_period.is_zero() {
        info!("Skipping drain period (GATEWAY_DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain_period.as_secs());
        tokio::time::sleep(drain_period).await;
        info!("Drain period complete");
    }
}
