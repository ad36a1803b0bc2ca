//! Middleware for the gateway.
//!
//! - `auth` - runs the auth filter in front of downstream routes
//! - `http_metrics` - HTTP request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, ClaimsExt};
pub use http_metrics::http_metrics_middleware;
