//! Mock key service for HTTP-level tests
//!
//! Wraps a `wiremock::MockServer` serving `GET /auth/public-key`.

use crate::crypto_fixtures::TestKeypair;
use gateway_service::auth::key_source::PUBLIC_KEY_PATH;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock of the service that publishes the token issuer's public key.
///
/// # Example
/// ```rust,ignore
/// let keys = MockKeyService::serving(&TestKeypair::new(1)).await;
/// let server = TestGatewayServer::spawn(&keys.uri(), test_downstream()).await?;
/// // ...
/// keys.rotate_to(&TestKeypair::new(2)).await;
/// ```
pub struct MockKeyService {
    server: MockServer,
}

impl MockKeyService {
    /// Start a mock with no responses mounted (every request gets a 404).
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start a mock serving `keypair`.
    pub async fn serving(keypair: &TestKeypair) -> Self {
        let service = Self::start().await;
        service.mount_key(keypair).await;
        service
    }

    /// Base URL to use as `KEY_SERVICE_BASE_URL`.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Serve `keypair` from now on.
    pub async fn mount_key(&self, keypair: &TestKeypair) {
        self.mount(ResponseTemplate::new(200).set_body_json(keypair.key_payload_json()))
            .await;
    }

    /// Replace whatever was mounted with `keypair`. Request history is cleared.
    pub async fn rotate_to(&self, keypair: &TestKeypair) {
        self.server.reset().await;
        self.mount_key(keypair).await;
    }

    /// Serve `keypair` after `delay`.
    pub async fn mount_key_with_delay(&self, keypair: &TestKeypair, delay: Duration) {
        self.mount(
            ResponseTemplate::new(200)
                .set_body_json(keypair.key_payload_json())
                .set_delay(delay),
        )
        .await;
    }

    /// Replace whatever was mounted with an error status.
    pub async fn fail_with(&self, status: u16) {
        self.server.reset().await;
        self.mount(ResponseTemplate::new(status)).await;
    }

    /// Replace whatever was mounted with a raw 200 body.
    pub async fn respond_with_body(&self, body: &str) {
        self.server.reset().await;
        self.mount(
            ResponseTemplate::new(200)
                .set_body_raw(body.as_bytes().to_vec(), "application/json"),
        )
        .await;
    }

    /// Number of public key requests received since the last reset.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == PUBLIC_KEY_PATH)
                    .count()
            })
            .unwrap_or(0)
    }

    async fn mount(&self, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(PUBLIC_KEY_PATH))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }
}
