//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs, the key service payload for them,
//! and token signing. All fixtures are deterministic based on seed values.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use gateway_service::auth::KeyMaterial;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::{Deserialize, Serialize};

/// SPKI prefix for an Ed25519 public key (RFC 8410).
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Deterministic Ed25519 keypair that can sign test tokens.
///
/// # Example
/// ```rust,ignore
/// let keypair = TestKeypair::new(1);
/// let token = keypair.sign_token(&TestClaims::valid("user-1"));
/// ```
#[derive(Clone)]
pub struct TestKeypair {
    seed: u8,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// The same seed always produces the same keypair.
    pub fn new(seed: u8) -> Self {
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
        }

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to create test keypair");

        Self {
            seed,
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    pub fn seed(&self) -> u8 {
        self.seed
    }

    /// Raw 32-byte Ed25519 public key.
    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key_bytes
    }

    /// X.509 SubjectPublicKeyInfo DER for the public key.
    pub fn spki_der(&self) -> Vec<u8> {
        let mut der = ED25519_SPKI_PREFIX.to_vec();
        der.extend_from_slice(&self.public_key_bytes);
        der
    }

    /// Base64 (standard alphabet) SPKI DER, as the key service publishes it.
    pub fn public_key_b64(&self) -> String {
        STANDARD.encode(self.spki_der())
    }

    /// Body of `GET /auth/public-key` for this key.
    pub fn key_payload_json(&self) -> serde_json::Value {
        serde_json::json!({
            "algorithm": "Ed25519",
            "key": self.public_key_b64(),
        })
    }

    /// Decoded key material, as the provider would cache it.
    pub fn key_material(&self) -> KeyMaterial {
        KeyMaterial::from_spki_der("Ed25519", self.spki_der())
            .expect("test keypair SPKI should decode")
    }

    /// Sign `claims` as an EdDSA compact JWS.
    pub fn sign_token<T: Serialize>(&self, claims: &T) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());

        encode(&header, claims, &encoding_key).expect("Failed to sign token")
    }
}

/// Build PKCS#8 v1 document from Ed25519 seed.
///
/// This is a test-only utility. Production code must use ring::rand::SystemRandom.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::new();

    // Outer SEQUENCE tag
    pkcs8.push(0x30);
    pkcs8.push(0x2e); // Length: 46 bytes

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // Algorithm Identifier: SEQUENCE, OID 1.3.101.112
    pkcs8.push(0x30);
    pkcs8.push(0x05);
    pkcs8.extend_from_slice(&[0x06, 0x03, 0x2b, 0x65, 0x70]);

    // Private Key: OCTET STRING wrapping OCTET STRING with the seed
    pkcs8.push(0x04);
    pkcs8.push(0x22);
    pkcs8.push(0x04);
    pkcs8.push(0x20);
    pkcs8.extend_from_slice(seed);

    pkcs8
}

/// Claims used by test tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    pub exp: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl TestClaims {
    /// Claims valid for the next hour.
    pub fn valid(sub: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: Some(sub.to_string()),
            exp: now + 3600,
            iat: Some(now),
            nbf: None,
            role: Some("USER".to_string()),
        }
    }

    /// Claims that expired an hour ago.
    pub fn expired(sub: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            exp: now - 3600,
            iat: Some(now - 7200),
            ..Self::valid(sub)
        }
    }

    /// Claims whose `iat` is `secs_ahead` seconds in the future.
    pub fn issued_in_future(sub: &str, secs_ahead: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            exp: now + secs_ahead + 3600,
            iat: Some(now + secs_ahead),
            ..Self::valid(sub)
        }
    }

    /// Claims not valid until an hour from now.
    pub fn not_yet_valid(sub: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            nbf: Some(now + 3600),
            exp: now + 7200,
            ..Self::valid(sub)
        }
    }
}
