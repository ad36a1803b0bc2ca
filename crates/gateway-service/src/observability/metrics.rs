//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gw_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: gateway-owned paths, `/fallback/{service}`, or `/other`
//! - `outcome`/`reason`: bounded by `RejectReason`
//! - `trigger`: expired, refresh
//! - `service`: the six downstream services

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle for `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Key fetches are bounded by the fetch timeout (max 30s)
        .set_buckets_for_metric(
            Matcher::Prefix("gw_key_fetch".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set key fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gw_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/unauthorized/unavailable/error.
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        401 => "unauthorized",
        503 => "unavailable",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize the request path so downstream paths cannot blow up cardinality.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" => path.to_string(),
        _ if path.starts_with("/fallback/") => "/fallback/{service}".to_string(),
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Record an auth filter decision.
///
/// Metric: `gw_auth_decisions_total`
/// Labels: `outcome` (allowed, rejected), `reason`
pub fn record_auth_decision(outcome: &str, reason: &str) {
    counter!("gw_auth_decisions_total",
        "outcome" => outcome.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a key cache lookup from `get_key`.
///
/// Metric: `gw_key_cache_lookups_total`
/// Labels: `result` (hit, miss)
pub fn record_key_cache_lookup(result: &str) {
    counter!("gw_key_cache_lookups_total", "result" => result.to_string()).increment(1);
}

/// Record a key fetch against the key service.
///
/// Metric: `gw_key_fetch_total`, `gw_key_fetch_duration_seconds`
/// Labels: `trigger` (expired, refresh), `status` (success, error)
pub fn record_key_fetch(trigger: &str, status: &str, duration: Duration) {
    histogram!("gw_key_fetch_duration_seconds", "trigger" => trigger.to_string())
        .record(duration.as_secs_f64());

    counter!("gw_key_fetch_total",
        "trigger" => trigger.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Fallback Metrics
// ============================================================================

/// Record a fallback response served for an unavailable service.
///
/// Metric: `gw_fallback_responses_total`
/// Labels: `service`
pub fn record_fallback_response(service: &str) {
    counter!("gw_fallback_responses_total", "service" => service.to_string()).increment(1);
}
