//! Gateway models.
//!
//! Response bodies and the set of downstream services the gateway fronts.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Downstream service that can have a fallback response rendered for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownstreamService {
    Auth,
    Users,
    Products,
    Cart,
    Orders,
    Payments,
}

impl DownstreamService {
    pub const ALL: [DownstreamService; 6] = [
        DownstreamService::Auth,
        DownstreamService::Users,
        DownstreamService::Products,
        DownstreamService::Cart,
        DownstreamService::Orders,
        DownstreamService::Payments,
    ];

    /// Path segment under `/fallback/`.
    pub fn as_str(self) -> &'static str {
        match self {
            DownstreamService::Auth => "auth",
            DownstreamService::Users => "users",
            DownstreamService::Products => "products",
            DownstreamService::Cart => "cart",
            DownstreamService::Orders => "orders",
            DownstreamService::Payments => "payments",
        }
    }

    /// Human-readable name used in fallback messages.
    pub fn display_name(self) -> &'static str {
        match self {
            DownstreamService::Auth => "Auth Service",
            DownstreamService::Users => "User Service",
            DownstreamService::Products => "Product Service",
            DownstreamService::Cart => "Cart Service",
            DownstreamService::Orders => "Order Service",
            DownstreamService::Payments => "Payment Service",
        }
    }
}

impl fmt::Display for DownstreamService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown service name in a fallback path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service '{0}'")]
pub struct UnknownService(pub String);

impl FromStr for DownstreamService {
    type Err = UnknownService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DownstreamService::ALL
            .into_iter()
            .find(|service| service.as_str() == s)
            .ok_or_else(|| UnknownService(s.to_string()))
    }
}

/// Body of a fallback response.
///
/// `status` is a string ("503") to keep the wire format clients already parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackResponse {
    pub error: String,
    pub message: String,
    pub status: String,
}

/// Readiness check response.
///
/// Returned by the `/ready` endpoint (readiness probe).
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Whether a verification key could be obtained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_key: Option<&'static str>,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
