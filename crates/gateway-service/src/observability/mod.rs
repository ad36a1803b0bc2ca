//! Observability for the gateway: metric definitions and recording helpers.

pub mod metrics;
