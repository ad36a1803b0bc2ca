//! API Gateway Auth Library
//!
//! Authentication edge of an API gateway fronting the auth, users,
//! products, cart, orders, and payments services:
//!
//! - Bearer token verification against the issuer's published public key
//! - Public key cache with TTL, coalesced fetches, and forced refresh
//! - One refresh-and-retry per request to absorb key rotation
//! - Exact-path allow-list for unauthenticated endpoints
//! - Canned 503 responses for the circuit breaker's fallback routes
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/filter.rs -> auth/key_provider.rs
//!                                                        -> auth/verifier.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key cache, token verification, and the auth filter
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - Health, metrics, and fallback handlers
//! - `middleware` - Auth and HTTP metrics middleware
//! - `models` - Response bodies and downstream service names
//! - `observability` - Metric definitions
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
