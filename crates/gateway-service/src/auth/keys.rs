//! Verification key material.
//!
//! The key service publishes a single public key as
//! `{"algorithm": "...", "key": "<base64 SubjectPublicKeyInfo DER>"}`.
//! A [`KeyMaterial`] is the decoded, immutable form of one such response.
//! Refreshing produces a new instance; existing instances are never mutated.

use base64::{engine::general_purpose::STANDARD, Engine};
use common::pem::public_key_der_to_pem;
use jsonwebtoken::{Algorithm, DecodingKey};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors produced while obtaining a verification key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Network failure, timeout, or non-success status from the key service.
    #[error("Key fetch failed: {0}")]
    Fetch(String),

    /// Response body, base64 payload, or key algorithm could not be used.
    #[error("Key parse failed: {0}")]
    Parse(String),
}

impl KeyError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            KeyError::Fetch(_) => "fetch",
            KeyError::Parse(_) => "parse",
        }
    }
}

/// Public key family named by the key service's `algorithm` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ec,
    Ed25519,
}

impl KeyFamily {
    /// JWS algorithms a key of this family can verify.
    pub fn algorithms(self) -> &'static [Algorithm] {
        match self {
            KeyFamily::Rsa => &[
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::PS256,
                Algorithm::PS384,
                Algorithm::PS512,
            ],
            KeyFamily::Ec => &[Algorithm::ES256, Algorithm::ES384],
            KeyFamily::Ed25519 => &[Algorithm::EdDSA],
        }
    }

    fn decoding_key(self, pem: &[u8]) -> jsonwebtoken::errors::Result<DecodingKey> {
        match self {
            KeyFamily::Rsa => DecodingKey::from_rsa_pem(pem),
            KeyFamily::Ec => DecodingKey::from_ec_pem(pem),
            KeyFamily::Ed25519 => DecodingKey::from_ed_pem(pem),
        }
    }
}

impl FromStr for KeyFamily {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RSA" => Ok(KeyFamily::Rsa),
            "EC" | "ECDSA" => Ok(KeyFamily::Ec),
            "ED25519" | "EDDSA" => Ok(KeyFamily::Ed25519),
            _ => Err(KeyError::Parse(format!("unsupported key algorithm '{s}'"))),
        }
    }
}

/// One decoded verification key plus the instant it was fetched.
pub struct KeyMaterial {
    algorithm: String,
    family: KeyFamily,
    raw_key_bytes: Vec<u8>,
    decoding_key: DecodingKey,
    fetched_at: Instant,
}

impl KeyMaterial {
    /// Decode a key service payload: `algorithm` plus base64 SPKI DER.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Parse` for bad base64, an unsupported algorithm, or
    /// DER that is not a public key of the named family.
    pub fn from_encoded(algorithm: &str, key_b64: &str) -> Result<Self, KeyError> {
        let der = STANDARD
            .decode(key_b64.trim())
            .map_err(|e| KeyError::Parse(format!("invalid base64 key payload: {e}")))?;
        Self::from_spki_der(algorithm, der)
    }

    /// Build key material from `SubjectPublicKeyInfo` DER bytes.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Parse` if the algorithm is unsupported or the DER
    /// does not hold a public key of that family.
    pub fn from_spki_der(algorithm: &str, der: Vec<u8>) -> Result<Self, KeyError> {
        let family = KeyFamily::from_str(algorithm)?;
        if der.is_empty() {
            return Err(KeyError::Parse("empty key payload".to_string()));
        }

        let pem = public_key_der_to_pem(&der);
        let decoding_key = family.decoding_key(pem.as_bytes()).map_err(|e| {
            KeyError::Parse(format!("{algorithm} public key could not be decoded: {e}"))
        })?;

        Ok(Self {
            algorithm: algorithm.to_string(),
            family,
            raw_key_bytes: der,
            decoding_key,
            fetched_at: Instant::now(),
        })
    }

    /// Algorithm name as published by the key service.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// SPKI DER bytes exactly as received.
    pub fn raw_key_bytes(&self) -> &[u8] {
        &self.raw_key_bytes
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Instant after which this key is stale under `ttl`.
    pub fn expires_at(&self, ttl: Duration) -> Instant {
        self.fetched_at + ttl
    }

    /// A key is fresh while `now - fetched_at <= ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() <= ttl
    }

    /// Whether a token signed with `alg` can be verified by this key.
    pub fn accepts(&self, alg: Algorithm) -> bool {
        self.family.algorithms().contains(&alg)
    }
}

/// Key bytes are not printed; they are public but noisy.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("family", &self.family)
            .field("key_len", &self.raw_key_bytes.len())
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}
