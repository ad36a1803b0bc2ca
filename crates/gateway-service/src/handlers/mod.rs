//! HTTP request handlers owned by the gateway.

pub mod fallback;
pub mod health;
pub mod metrics;

pub use fallback::fallback_handler;
pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
