//! Per-request authentication decision.
//!
//! ```text
//! allow-list hit            -> Allowed(None)
//! no Authorization header   -> Rejected(MissingHeader)
//! not "Bearer <token>"      -> Rejected(MalformedHeader)
//! verify with cached key    -> Allowed(Some(claims))
//!   else refresh key once
//!     refresh failed        -> Rejected(KeyUnavailable)
//!     verify with new key   -> Allowed(Some(claims))
//!     else                  -> Rejected(InvalidSignature)
//! ```
//!
//! A refresh replaces the shared cache, so one request's retry also serves
//! every later request. There is never more than one refresh per request.

use crate::auth::allow_list::AllowList;
use crate::auth::claims::Claims;
use crate::auth::key_provider::KeyProvider;
use crate::auth::verifier::TokenVerifier;
use crate::observability::metrics::record_auth_decision;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

const BEARER_PREFIX: &str = "Bearer ";

/// Why a request was rejected. Logged, never sent to the client.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("malformed Authorization header")]
    MalformedHeader,

    #[error("token failed verification")]
    InvalidSignature,

    #[error("verification key unavailable")]
    KeyUnavailable,
}

impl RejectReason {
    /// Metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::MissingHeader => "missing_header",
            RejectReason::MalformedHeader => "malformed_header",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::KeyUnavailable => "key_unavailable",
        }
    }
}

/// Result of running the filter on one request.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// Forward. Claims are `None` for allow-listed paths.
    Allowed(Option<Claims>),

    /// Respond 401.
    Rejected(RejectReason),
}

impl AuthOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthOutcome::Allowed(_))
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            AuthOutcome::Allowed(_) => None,
            AuthOutcome::Rejected(reason) => Some(*reason),
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-sensitively with exactly one space.
///
/// # Errors
///
/// `MissingHeader` if there is no Authorization header; `MalformedHeader` if
/// it is not valid ASCII, uses another scheme, or carries an empty token.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, RejectReason> {
    let value = headers.get(AUTHORIZATION).ok_or_else(|| {
        tracing::debug!(target: "gw.auth.filter", "Missing Authorization header");
        RejectReason::MissingHeader
    })?;

    let value = value.to_str().map_err(|_| {
        tracing::debug!(target: "gw.auth.filter", "Authorization header is not valid ASCII");
        RejectReason::MalformedHeader
    })?;

    match value.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.trim().is_empty() => Ok(token),
        _ => {
            tracing::debug!(target: "gw.auth.filter", "Invalid Authorization header format");
            Err(RejectReason::MalformedHeader)
        }
    }
}

/// Runs the allow-list, extraction, and verify/refresh/retry sequence.
pub struct AuthFilter {
    allow_list: AllowList,
    key_provider: Arc<KeyProvider>,
    verifier: TokenVerifier,
}

impl AuthFilter {
    pub fn new(allow_list: AllowList, key_provider: Arc<KeyProvider>, verifier: TokenVerifier) -> Self {
        Self {
            allow_list,
            key_provider,
            verifier,
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn key_provider(&self) -> &Arc<KeyProvider> {
        &self.key_provider
    }

    /// Decide whether a request for `path` with `headers` may be forwarded.
    #[instrument(skip_all, name = "gw.auth.filter", fields(path = %path))]
    pub async fn authorize(&self, path: &str, headers: &HeaderMap) -> AuthOutcome {
        let outcome = self.decide(path, headers).await;

        match &outcome {
            AuthOutcome::Allowed(None) => record_auth_decision("allowed", "allow_list"),
            AuthOutcome::Allowed(Some(_)) => record_auth_decision("allowed", "verified"),
            AuthOutcome::Rejected(reason) => {
                tracing::info!(target: "gw.auth.filter", reason = reason.as_str(), "Request rejected");
                record_auth_decision("rejected", reason.as_str());
            }
        }

        outcome
    }

    async fn decide(&self, path: &str, headers: &HeaderMap) -> AuthOutcome {
        if self.allow_list.is_allowed(path) {
            tracing::trace!(target: "gw.auth.filter", "Path is allow-listed");
            return AuthOutcome::Allowed(None);
        }

        let token = match extract_bearer_token(headers) {
            Ok(token) => token,
            Err(reason) => return AuthOutcome::Rejected(reason),
        };

        match self.key_provider.get_key().await {
            Ok(key) => match self.verifier.verify(token, &key) {
                Ok(claims) => return AuthOutcome::Allowed(Some(claims)),
                Err(e) => {
                    tracing::debug!(
                        target: "gw.auth.filter",
                        error = e.as_str(),
                        "Cached key did not verify token, refreshing"
                    );
                }
            },
            Err(e) => {
                tracing::debug!(target: "gw.auth.filter", error = %e, "No cached key, refreshing");
            }
        }

        let key = match self.key_provider.refresh().await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(target: "gw.auth.filter", error = %e, "Key refresh failed");
                return AuthOutcome::Rejected(RejectReason::KeyUnavailable);
            }
        };

        match self.verifier.verify(token, &key) {
            Ok(claims) => {
                tracing::debug!(target: "gw.auth.filter", "Token verified after key refresh");
                AuthOutcome::Allowed(Some(claims))
            }
            Err(e) => {
                tracing::debug!(
                    target: "gw.auth.filter",
                    error = e.as_str(),
                    "Refreshed key did not verify token"
                );
                AuthOutcome::Rejected(RejectReason::InvalidSignature)
            }
        }
    }
}
