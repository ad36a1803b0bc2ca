//! Fallback responses for unavailable downstream services.
//!
//! A circuit breaker in front of the gateway redirects here when a service is
//! down. The handler only renders the canned 503; it makes no decisions.

use crate::errors::GatewayError;
use crate::models::{DownstreamService, FallbackResponse};
use crate::observability::metrics::record_fallback_response;
use axum::{extract::Path, http::StatusCode, Json};
use std::str::FromStr;

/// Build the 503 response for `service`.
pub fn respond(service: DownstreamService) -> (StatusCode, Json<FallbackResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(FallbackResponse {
            error: "Service Unavailable".to_string(),
            message: format!(
                "{} is currently unavailable. Please try again later.",
                service.display_name()
            ),
            status: StatusCode::SERVICE_UNAVAILABLE.as_u16().to_string(),
        }),
    )
}

/// Handler for GET /fallback/{service}
///
/// # Response
///
/// - 503 with a `FallbackResponse` body for a known service
/// - 404 for any other service name
#[tracing::instrument(skip_all, name = "gw.fallback", fields(service = %service))]
pub async fn fallback_handler(
    Path(service): Path<String>,
) -> Result<(StatusCode, Json<FallbackResponse>), GatewayError> {
    let service = DownstreamService::from_str(&service).map_err(|e| {
        tracing::debug!(target: "gw.fallback", error = %e, "Fallback requested for unknown service");
        GatewayError::NotFound("Unknown service".to_string())
    })?;

    tracing::info!(target: "gw.fallback", service = %service, "Serving fallback response");
    record_fallback_response(service.as_str());

    Ok(respond(service))
}
