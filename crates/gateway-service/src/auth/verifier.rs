//! Access token verification against a single key.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header `alg` must belong to the key's family; `none` and HMAC are
//!   never accepted
//! - `exp` is required; `nbf` is honoured when present
//! - `iat` more than the configured clock skew in the future is rejected
//! - Error messages are generic; the detail goes to debug logs

use crate::auth::claims::Claims;
use crate::auth::keys::KeyMaterial;
use common::jwt::{extract_alg, validate_iat, JwtValidationError, DEFAULT_CLOCK_SKEW};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Why a token failed verification.
///
/// Every variant maps to the same client-facing 401; the distinction is for
/// logs and tests.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("token exceeds maximum size")]
    TokenTooLarge,

    #[error("token is malformed")]
    Malformed,

    #[error("token algorithm does not match verification key")]
    AlgorithmMismatch,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token issued in the future")]
    IatInFuture,
}

impl VerifyError {
    /// Short label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            VerifyError::TokenTooLarge => "token_too_large",
            VerifyError::Malformed => "malformed",
            VerifyError::AlgorithmMismatch => "algorithm_mismatch",
            VerifyError::InvalidSignature => "invalid_signature",
            VerifyError::Expired => "expired",
            VerifyError::NotYetValid => "not_yet_valid",
            VerifyError::IatInFuture => "iat_in_future",
        }
    }
}

impl From<JwtValidationError> for VerifyError {
    fn from(e: JwtValidationError) -> Self {
        match e {
            JwtValidationError::TokenTooLarge => VerifyError::TokenTooLarge,
            JwtValidationError::MalformedToken | JwtValidationError::MissingAlg => {
                VerifyError::Malformed
            }
            JwtValidationError::IatTooFarInFuture => VerifyError::IatInFuture,
        }
    }
}

/// Verifies compact JWS access tokens. Stateless; the key is supplied per call.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    clock_skew: Duration,
}

impl Default for TokenVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_SKEW)
    }
}

impl TokenVerifier {
    pub fn new(clock_skew: Duration) -> Self {
        Self { clock_skew }
    }

    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Verify `token` with `key` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns the `VerifyError` describing the first check that failed.
    pub fn verify(&self, token: &str, key: &KeyMaterial) -> Result<Claims, VerifyError> {
        let alg_name = extract_alg(token).map_err(VerifyError::from)?;

        let alg = Algorithm::from_str(&alg_name).map_err(|_| {
            tracing::debug!(target: "gw.auth.verify", alg = %alg_name, "Unsupported token algorithm");
            VerifyError::AlgorithmMismatch
        })?;

        if !key.accepts(alg) {
            tracing::debug!(
                target: "gw.auth.verify",
                token_alg = ?alg,
                key_family = ?key.family(),
                "Token algorithm does not match key family"
            );
            return Err(VerifyError::AlgorithmMismatch);
        }

        let mut validation = Validation::new(alg);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Clock skew tolerance applies to `iat` only
        validation.leeway = 0;
        // Audience is not part of the gateway's contract with the issuer
        validation.validate_aud = false;

        let token_data =
            decode::<Claims>(token, key.decoding_key(), &validation).map_err(|e| {
                tracing::debug!(target: "gw.auth.verify", error = %e, "Token verification failed");
                map_jwt_error(e.kind())
            })?;

        let claims = token_data.claims;
        if let Some(iat) = claims.iat {
            validate_iat(iat, self.clock_skew).map_err(VerifyError::from)?;
        }

        Ok(claims)
    }
}

fn map_jwt_error(kind: &ErrorKind) -> VerifyError {
    match kind {
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        ErrorKind::ImmatureSignature => VerifyError::NotYetValid,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            VerifyError::AlgorithmMismatch
        }
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::MissingRequiredClaim(_) => VerifyError::Malformed,
        _ => VerifyError::InvalidSignature,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::keys::tests::test_key;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use common::jwt::MAX_JWT_SIZE_BYTES;

    fn unsigned_token(header: &str, payload: &str) -> String {
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode([0u8; 64])
        )
    }

    #[test]
    fn test_default_clock_skew() {
        assert_eq!(TokenVerifier::default().clock_skew(), DEFAULT_CLOCK_SKEW);
    }

    #[test]
    fn test_oversized_token_rejected_before_parsing() {
        let verifier = TokenVerifier::default();
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);

        assert_eq!(
            verifier.verify(&token, &test_key(1)).unwrap_err(),
            VerifyError::TokenTooLarge
        );
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let verifier = TokenVerifier::default();
        let key = test_key(1);

        assert_eq!(verifier.verify("abc", &key).unwrap_err(), VerifyError::Malformed);
        assert_eq!(
            verifier.verify("a.b.c", &key).unwrap_err(),
            VerifyError::Malformed
        );
    }

    #[test]
    fn test_alg_none_rejected() {
        let verifier = TokenVerifier::default();
        let token = unsigned_token(r#"{"alg":"none"}"#, r#"{"exp":9999999999}"#);

        assert_eq!(
            verifier.verify(&token, &test_key(1)).unwrap_err(),
            VerifyError::AlgorithmMismatch
        );
    }

    #[test]
    fn test_hmac_alg_rejected_for_public_key() {
        let verifier = TokenVerifier::default();
        let token = unsigned_token(r#"{"alg":"HS256"}"#, r#"{"exp":9999999999}"#);

        assert_eq!(
            verifier.verify(&token, &test_key(1)).unwrap_err(),
            VerifyError::AlgorithmMismatch
        );
    }

    #[test]
    fn test_rsa_alg_rejected_for_ed25519_key() {
        let verifier = TokenVerifier::default();
        let token = unsigned_token(r#"{"alg":"RS256"}"#, r#"{"exp":9999999999}"#);

        assert_eq!(
            verifier.verify(&token, &test_key(1)).unwrap_err(),
            VerifyError::AlgorithmMismatch
        );
    }

    #[test]
    fn test_forged_signature_rejected() {
        let verifier = TokenVerifier::default();
        let token = unsigned_token(r#"{"alg":"EdDSA"}"#, r#"{"exp":9999999999}"#);

        assert_eq!(
            verifier.verify(&token, &test_key(1)).unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[test]
    fn test_verify_error_from_common_errors() {
        assert_eq!(
            VerifyError::from(JwtValidationError::MissingAlg),
            VerifyError::Malformed
        );
        assert_eq!(
            VerifyError::from(JwtValidationError::IatTooFarInFuture),
            VerifyError::IatInFuture
        );
    }

    #[test]
    fn test_verify_error_messages_are_generic() {
        for err in [
            VerifyError::Malformed,
            VerifyError::InvalidSignature,
            VerifyError::Expired,
        ] {
            assert!(!err.to_string().is_empty());
            assert!(!err.as_str().contains(' '));
        }
    }
}
