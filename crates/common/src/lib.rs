//! Common utilities and types shared across the gateway crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (size limits, clock skew, iat validation)
pub mod jwt;

/// Module for public key encoding helpers
pub mod pem;
