use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::instance::RegistrationError;

/// Body of every error response produced by the gateway itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Request-level failures surfaced to callers.
///
/// Messages are generic on purpose; backend details are only logged.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("No route configured for path {0}")]
    RouteNotFound(String),

    #[error("No healthy instance available for service '{0}'")]
    NoHealthyInstance(String),

    #[error("Circuit breaker is open for service '{0}'")]
    CircuitOpen(String),

    #[error("Upstream service '{0}' failed to respond")]
    BadGateway(String),

    #[error("Upstream service '{0}' timed out")]
    UpstreamTimeout(String),

    #[error("Invalid registration: {0}")]
    InvalidRegistration(#[from] RegistrationError),

    #[error("Instance '{0}' not found")]
    InstanceNotFound(String),

    #[error("Internal gateway error")]
    Internal,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound(_) | GatewayError::InstanceNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::NoHealthyInstance(_) | GatewayError::CircuitOpen(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::BadGateway(_) | GatewayError::UpstreamTimeout(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::InvalidRegistration(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound(_) => "route_not_found",
            GatewayError::NoHealthyInstance(_) | GatewayError::CircuitOpen(_) => {
                "service_unavailable"
            }
            GatewayError::BadGateway(_) | GatewayError::UpstreamTimeout(_) => "bad_gateway",
            GatewayError::InvalidRegistration(_) => "invalid_registration",
            GatewayError::InstanceNotFound(_) => "not_found",
            GatewayError::Internal => "internal_error",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
