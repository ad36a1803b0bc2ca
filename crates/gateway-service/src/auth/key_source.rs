//! Remote source of the verification key.
//!
//! [`KeySource`] is the seam between the key provider and the network.
//! Production uses [`HttpKeySource`]; tests substitute counting mocks.

use crate::auth::keys::{KeyError, KeyMaterial};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

/// Path of the public key endpoint on the key service.
pub const PUBLIC_KEY_PATH: &str = "/auth/public-key";

/// Connect timeout cap; the overall fetch timeout still applies.
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of `GET /auth/public-key`.
#[derive(Debug, Clone, Deserialize)]
pub struct PublicKeyResponse {
    /// Key family, e.g. "RSA".
    pub algorithm: String,

    /// Base64 (standard alphabet) SubjectPublicKeyInfo DER.
    pub key: String,
}

/// Something that can produce the issuer's current verification key.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch and decode the current key.
    async fn fetch(&self) -> Result<KeyMaterial, KeyError>;
}

/// Fetches the key from the key service over HTTP.
pub struct HttpKeySource {
    /// Full URL of the public key endpoint.
    key_url: String,

    /// HTTP client carrying the fetch timeout.
    http_client: reqwest::Client,
}

impl HttpKeySource {
    /// Create a key source for `base_url` with an overall request timeout.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Fetch` if the HTTP client cannot be built. The
    /// timeout is mandatory, so there is no fallback to a default client.
    pub fn new(base_url: &str, fetch_timeout: Duration) -> Result<Self, KeyError> {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .connect_timeout(fetch_timeout.min(MAX_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| {
                tracing::error!(target: "gw.auth.keys", error = %e, "Failed to build key service HTTP client");
                KeyError::Fetch(format!("HTTP client construction failed: {e}"))
            })?;

        Ok(Self {
            key_url: format!("{}{}", base_url.trim_end_matches('/'), PUBLIC_KEY_PATH),
            http_client,
        })
    }

    pub fn key_url(&self) -> &str {
        &self.key_url
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    #[instrument(skip_all, name = "gw.auth.keys.fetch")]
    async fn fetch(&self) -> Result<KeyMaterial, KeyError> {
        tracing::debug!(target: "gw.auth.keys", url = %self.key_url, "Fetching public key");

        let response = self
            .http_client
            .get(&self.key_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    target: "gw.auth.keys",
                    error = %e,
                    timeout = e.is_timeout(),
                    "Failed to fetch public key"
                );
                KeyError::Fetch(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(target: "gw.auth.keys", status = %status, "Public key endpoint returned error");
            return Err(KeyError::Fetch(format!("key service returned {status}")));
        }

        let body: PublicKeyResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                tracing::error!(target: "gw.auth.keys", error = %e, "Timed out reading public key response");
                return KeyError::Fetch(format!("response read timed out: {e}"));
            }
            tracing::error!(target: "gw.auth.keys", error = %e, "Failed to parse public key response");
            KeyError::Parse(format!("malformed key response: {e}"))
        })?;

        let key = KeyMaterial::from_encoded(&body.algorithm, &body.key).map_err(|e| {
            tracing::error!(target: "gw.auth.keys", algorithm = %body.algorithm, error = %e, "Failed to decode public key");
            e
        })?;

        tracing::debug!(target: "gw.auth.keys", algorithm = %key.algorithm(), "Public key decoded");
        Ok(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_response_deserialization() {
        let json = r#"{"algorithm":"RSA","key":"MIIBIjANBgkq"}"#;
        let body: PublicKeyResponse = serde_json::from_str(json).unwrap();

        assert_eq!(body.algorithm, "RSA");
        assert_eq!(body.key, "MIIBIjANBgkq");
    }

    #[test]
    fn test_public_key_response_requires_both_fields() {
        assert!(serde_json::from_str::<PublicKeyResponse>(r#"{"algorithm":"RSA"}"#).is_err());
        assert!(serde_json::from_str::<PublicKeyResponse>(r#"{"key":"abc"}"#).is_err());
    }

    #[test]
    fn test_key_url_joins_base_and_path() {
        let source = HttpKeySource::new("http://localhost:8081", Duration::from_secs(2)).unwrap();
        assert_eq!(source.key_url(), "http://localhost:8081/auth/public-key");
    }

    #[test]
    fn test_key_url_strips_trailing_slash() {
        let source = HttpKeySource::new("http://auth:8081/", Duration::from_secs(2)).unwrap();
        assert_eq!(source.key_url(), "http://auth:8081/auth/public-key");
    }
}
