//! PEM encoding for DER public keys.
//!
//! The key service publishes X.509 `SubjectPublicKeyInfo` DER. `jsonwebtoken`
//! only accepts SPKI through its PEM constructors, so DER is re-wrapped here.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Label used for `SubjectPublicKeyInfo` PEM blocks.
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// Base64 characters per PEM body line (RFC 7468).
const PEM_LINE_WIDTH: usize = 64;

/// Wrap `SubjectPublicKeyInfo` DER bytes in a `PUBLIC KEY` PEM block.
#[must_use]
pub fn public_key_der_to_pem(der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {PUBLIC_KEY_LABEL}-----\n");
    for chunk in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        // base64 output is ASCII, so every chunk is valid UTF-8
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {PUBLIC_KEY_LABEL}-----\n"));
    pem
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pem_has_header_and_footer() {
        let pem = public_key_der_to_pem(&[0x30, 0x2a, 0x30, 0x05]);

        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----\n"));
        assert!(pem.ends_with("-----END PUBLIC KEY-----\n"));
    }

    #[test]
    fn test_pem_wraps_body_at_64_columns() {
        let der = vec![0xAB; 200];
        let pem = public_key_der_to_pem(&der);

        let body: Vec<&str> = pem
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect();
        assert!(body.len() > 1);
        assert!(body.iter().all(|line| line.len() <= PEM_LINE_WIDTH));

        let decoded = STANDARD.decode(body.concat()).unwrap();
        assert_eq!(decoded, der);
    }
}
