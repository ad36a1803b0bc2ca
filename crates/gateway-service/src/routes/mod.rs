//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::{
    AllowList, AuthFilter, HttpKeySource, KeyError, KeyProvider, KeySource, TokenVerifier,
};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Overall request timeout applied to every route.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Verification key cache, shared with the auth filter.
    pub key_provider: Arc<KeyProvider>,

    /// Auth filter run in front of downstream routes.
    pub auth_filter: Arc<AuthFilter>,
}

impl AppState {
    /// Build state that fetches keys from `config.key_service_base_url`.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Fetch` if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, KeyError> {
        let source = HttpKeySource::new(&config.key_service_base_url, config.key_fetch_timeout)?;
        tracing::info!(target: "gw.auth.keys", url = %source.key_url(), "Key source configured");
        Ok(Self::with_key_source(config, Arc::new(source)))
    }

    /// Build state around an arbitrary key source.
    pub fn with_key_source(config: Config, source: Arc<dyn KeySource>) -> Self {
        let key_provider = Arc::new(
            KeyProvider::new(source, config.key_cache_ttl)
                .with_stale_policy(config.stale_key_policy),
        );
        let auth_filter = Arc::new(AuthFilter::new(
            AllowList::new(config.allow_list_paths.iter().cloned()),
            Arc::clone(&key_provider),
            TokenVerifier::new(config.jwt_clock_skew),
        ));

        Self {
            config,
            key_provider,
            auth_filter,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - public
/// - `/ready` - Readiness probe (verification key available) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/fallback/:service` - 503 responses for the circuit breaker - public
/// - every other path goes to `downstream` behind `require_auth`
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
///
/// `downstream` is the only source of service routes. Passing an empty
/// router leaves authenticated requests to unmatched paths with a 404.
pub fn build_routes(
    state: Arc<AppState>,
    downstream: Router,
    metrics_handle: PrometheusHandle,
) -> Router {
    // Gateway-owned routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/fallback/:service", get(handlers::fallback_handler))
        .with_state(Arc::clone(&state));

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Downstream routes and unmatched paths (authentication required).
    // `layer` rather than `route_layer` so requests for unknown paths are
    // authenticated before the 404.
    let protected = downstream.layer(middleware::from_fn_with_state(
        Arc::clone(&state.auth_filter),
        require_auth,
    ));

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .fallback_service(protected)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(http_metrics_middleware))
}
