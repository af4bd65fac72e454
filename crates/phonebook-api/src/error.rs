//! Error types for the phonebook HTTP API.
//!
//! Uses RFC 7807 Problem Details for HTTP APIs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use phonebook_directory::{FailureKind, ServiceFailure};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base URL for error type URIs.
const ERROR_BASE_URL: &str = "https://phonebook.local/errors";

/// RFC 7807 Problem Details structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI identifying the problem type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// Short human-readable summary.
    pub title: String,

    /// HTTP status code.
    pub status: u16,

    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Stable machine-readable error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ProblemDetails {
    #[must_use]
    pub fn new(error_type: &str, title: &str, status: StatusCode) -> Self {
        Self {
            error_type: format!("{ERROR_BASE_URL}/{error_type}"),
            title: title.to_string(),
            status: status.as_u16(),
            detail: None,
            code: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Phonebook API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid bearer token on a protected route.
    #[error("Unauthorized")]
    Unauthorized,

    /// The uploaded CSV could not be read as a whole.
    #[error("Invalid CSV: {0}")]
    InvalidCsv(String),

    /// The uploaded CSV has more data rows than allowed.
    #[error("Too many rows: {0}")]
    TooManyRows(String),

    /// Request body or parameters are unusable.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failure reported by the directory service.
    #[error("{}", .0.message)]
    Service(ServiceFailure),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ServiceFailure> for ApiError {
    fn from(failure: ServiceFailure) -> Self {
        ApiError::Service(failure)
    }
}

/// HTTP status for a directory service failure.
pub fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::Unauthorized => StatusCode::UNAUTHORIZED,
        FailureKind::InvalidInput => StatusCode::BAD_REQUEST,
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::Directory => StatusCode::BAD_GATEWAY,
        FailureKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    /// Convert to `ProblemDetails`.
    pub fn to_problem_details(&self) -> ProblemDetails {
        match self {
            ApiError::Unauthorized => {
                ProblemDetails::new("unauthorized", "Unauthorized", StatusCode::UNAUTHORIZED)
                    .with_detail("A valid bearer token is required.")
            }

            ApiError::InvalidCsv(msg) => {
                ProblemDetails::new("invalid-csv", "Invalid CSV", StatusCode::BAD_REQUEST)
                    .with_detail(msg.clone())
            }

            ApiError::TooManyRows(msg) => {
                ProblemDetails::new("too-many-rows", "Too Many Rows", StatusCode::BAD_REQUEST)
                    .with_detail(msg.clone())
            }

            ApiError::InvalidRequest(msg) => ProblemDetails::new(
                "invalid-request",
                "Invalid Request",
                StatusCode::BAD_REQUEST,
            )
            .with_detail(msg.clone()),

            ApiError::Service(failure) => {
                let (error_type, title) = match failure.kind {
                    FailureKind::Unauthorized => ("unauthorized", "Unauthorized"),
                    FailureKind::InvalidInput => ("invalid-request", "Invalid Request"),
                    FailureKind::Timeout => ("directory-timeout", "Directory Timeout"),
                    FailureKind::Directory => ("directory-error", "Directory Error"),
                    FailureKind::Configuration => {
                        tracing::error!(error = %failure.message, "Directory misconfigured");
                        ("configuration-error", "Configuration Error")
                    }
                };
                ProblemDetails::new(error_type, title, failure_status(failure.kind))
                    .with_detail(failure.message.clone())
                    .with_code(failure.code.clone())
            }

            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal API error");
                ProblemDetails::new(
                    "internal-error",
                    "Internal Server Error",
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
                .with_detail("An internal error occurred. Please try again later.")
            }
        }
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidCsv(_) => StatusCode::BAD_REQUEST,
            ApiError::TooManyRows(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(failure) => failure_status(failure.kind),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let problem = self.to_problem_details();

        let mut response = (status, Json(problem)).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: FailureKind) -> ServiceFailure {
        ServiceFailure {
            kind,
            code: "TEST".to_string(),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_service_failure_statuses() {
        assert_eq!(
            ApiError::from(failure(FailureKind::Timeout)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(failure(FailureKind::Directory)).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(failure(FailureKind::Unauthorized)).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(failure(FailureKind::InvalidInput)).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_problem_details_carry_code() {
        let problem = ApiError::from(failure(FailureKind::Directory)).to_problem_details();
        assert_eq!(problem.status, 502);
        assert_eq!(problem.code.as_deref(), Some("TEST"));
        assert_eq!(problem.detail.as_deref(), Some("boom"));
        assert!(problem.error_type.ends_with("/directory-error"));
    }

    #[test]
    fn test_problem_details_serialization() {
        let json = serde_json::to_value(ApiError::Unauthorized.to_problem_details()).unwrap();
        assert_eq!(json["type"], "https://phonebook.local/errors/unauthorized");
        assert_eq!(json["status"], 401);
        assert!(json.get("code").is_none());
    }

    #[test]
    fn test_problem_response_content_type() {
        let response = ApiError::InvalidCsv("empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/problem+json"
        );
    }
}
