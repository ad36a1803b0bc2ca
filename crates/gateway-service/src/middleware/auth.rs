//! Authentication middleware for downstream routes.
//!
//! Runs the [`AuthFilter`] on every request it wraps. Verified claims are
//! inserted into request extensions; rejections become a uniform 401.

use crate::auth::{AuthFilter, AuthOutcome, Claims};
use crate::errors::GatewayError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// Forward the request if the auth filter allows it.
///
/// # Response
///
/// - Returns 401 Unauthorized with `WWW-Authenticate` on any rejection
/// - Continues to the next handler otherwise, with `Claims` in extensions
///   when a token was verified
#[instrument(skip_all, name = "gw.middleware.auth")]
pub async fn require_auth(
    State(filter): State<Arc<AuthFilter>>,
    req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    // The body is not Sync; keep only the parts borrowed across the await
    let (mut parts, body) = req.into_parts();
    let outcome = filter.authorize(parts.uri.path(), &parts.headers).await;

    match outcome {
        AuthOutcome::Allowed(Some(claims)) => {
            parts.extensions.insert(claims);
        }
        AuthOutcome::Allowed(None) => {}
        AuthOutcome::Rejected(reason) => return Err(GatewayError::Unauthorized(reason)),
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Access to the claims `require_auth` stored on the request.
pub trait ClaimsExt {
    /// Returns `None` for allow-listed paths or if the middleware did not run.
    fn claims(&self) -> Option<&Claims>;
}

impl<B> ClaimsExt for axum::http::Request<B> {
    fn claims(&self) -> Option<&Claims> {
        self.extensions().get::<Claims>()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::keys::tests::ed25519_spki;
    use crate::auth::{AllowList, KeyError, KeyMaterial, KeyProvider, KeySource, TokenVerifier};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header::WWW_AUTHENTICATE, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use std::time::Duration;
    use tower::ServiceExt;

    struct StaticSource;

    #[async_trait]
    impl KeySource for StaticSource {
        async fn fetch(&self) -> Result<KeyMaterial, KeyError> {
            KeyMaterial::from_spki_der("Ed25519", ed25519_spki(3))
        }
    }

    async fn has_claims(req: Request) -> &'static str {
        if req.claims().is_some() {
            "claims"
        } else {
            "anonymous"
        }
    }

    fn test_app() -> Router {
        let provider = Arc::new(KeyProvider::new(Arc::new(StaticSource), Duration::from_secs(60)));
        let filter = Arc::new(AuthFilter::new(
            AllowList::default(),
            provider,
            TokenVerifier::default(),
        ));

        Router::new()
            .route("/auth/login", get(has_claims))
            .route("/orders", get(has_claims))
            .layer(middleware::from_fn_with_state(filter, require_auth))
    }

    #[tokio::test]
    async fn test_allow_listed_route_forwarded_without_claims() {
        let response = test_app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/auth/login")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_without_token_is_401() {
        let response = test_app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/orders")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_protected_route_with_bad_token_is_401() {
        let response = test_app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/orders")
                    .header("authorization", "Bearer a.b.c")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
