//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use domain_billing::DistributionError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The request raced another change; carries what differed
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        details: Vec<String>,
    },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized".to_string(),
                None,
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::Conflict { message, details } => {
                (StatusCode::CONFLICT, "conflict", message, Some(details))
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None)
            }
            ApiError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg, None)
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DistributionError> for ApiError {
    fn from(err: DistributionError) -> Self {
        match err {
            DistributionError::Validation(msg) => ApiError::Validation(msg),
            DistributionError::Money(e) => ApiError::Validation(e.to_string()),
            DistributionError::NotFound(msg) => ApiError::NotFound(msg),
            DistributionError::PreviewStale {
                expected,
                actual,
                reason,
            } => ApiError::Conflict {
                message: "Preview is stale; request a new preview and retry".to_string(),
                details: vec![
                    format!("expected_allocated: {}", expected),
                    format!("actual_allocated: {}", actual),
                    format!("reason: {}", reason),
                ],
            },
            DistributionError::CreditBalanceMismatch { expected, actual } => ApiError::Conflict {
                message: "Credit balance changed; request a new preview and retry".to_string(),
                details: vec![
                    format!("expected_credit: {}", expected),
                    format!("actual_credit: {}", actual),
                ],
            },
            other => {
                error!(error = %other, "Payment request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{MinorUnits, MoneyError, PortError};

    fn status_of(err: DistributionError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_distribution_error_status_codes() {
        assert_eq!(
            status_of(DistributionError::validation("negative amount")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(DistributionError::Money(MoneyError::Overflow)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(DistributionError::not_found("Unit ACME-HOA/999")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DistributionError::PreviewStale {
                expected: MinorUnits::new(8300),
                actual: MinorUnits::new(6300),
                reason: "total allocated differs".to_string(),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DistributionError::CreditBalanceMismatch {
                expected: MinorUnits::new(1000),
                actual: MinorUnits::new(0),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DistributionError::invariant("sum mismatch")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(DistributionError::Port(PortError::internal("db down"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_stale_preview_lists_details() {
        let api = ApiError::from(DistributionError::PreviewStale {
            expected: MinorUnits::new(8300),
            actual: MinorUnits::new(6300),
            reason: "total allocated differs".to_string(),
        });
        match api {
            ApiError::Conflict { details, .. } => {
                assert!(details.iter().any(|d| d.contains("8300")));
                assert!(details.iter().any(|d| d.contains("6300")));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }
}
