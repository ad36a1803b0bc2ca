//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer` for spawning the real gateway router in tests,
//! plus a small downstream router standing in for the proxied services.

use axum::extract::Extension;
use axum::routing::get;
use axum::{Json, Router};
use gateway_service::auth::Claims;
use gateway_service::config::Config;
use gateway_service::observability::metrics::init_metrics_recorder;
use gateway_service::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process-wide metrics handle; the global recorder can only be installed once.
pub fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder().unwrap_or_else(|_| {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle()
            })
        })
        .clone()
}

/// Downstream routes used by the E2E tests.
///
/// - `/orders`, `/users/me` - echo the verified subject as `{"sub": ...}`
/// - `/auth/login`, `/users/validate` - return `{"sub": null}` (allow-listed)
pub fn test_downstream() -> Router {
    async fn whoami(claims: Option<Extension<Claims>>) -> Json<serde_json::Value> {
        let sub = claims.and_then(|Extension(c)| c.sub);
        Json(serde_json::json!({ "sub": sub }))
    }

    Router::new()
        .route("/orders", get(whoami))
        .route("/users/me", get(whoami))
        .route("/auth/login", get(whoami).post(whoami))
        .route("/users/validate", get(whoami))
}

/// Test harness for spawning the gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<()> {
///     let keys = MockKeyService::serving(&TestKeypair::new(1)).await;
///     let server = TestGatewayServer::spawn(&keys.uri(), test_downstream()).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn with default configuration pointed at `key_service_base_url`.
    pub async fn spawn(key_service_base_url: &str, downstream: Router) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(key_service_base_url, HashMap::new(), downstream).await
    }

    /// Spawn with extra environment-style configuration overrides.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn_with_vars(
        key_service_base_url: &str,
        overrides: HashMap<String, String>,
        downstream: Router,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "KEY_SERVICE_BASE_URL".to_string(),
                key_service_base_url.to_string(),
            ),
            ("KEY_FETCH_TIMEOUT_MS".to_string(), "2000".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(
            AppState::new(config).map_err(|e| anyhow::anyhow!("Failed to create state: {}", e))?,
        );

        let app = routes::build_routes(Arc::clone(&state), downstream, test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared state, for inspecting the key cache.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
