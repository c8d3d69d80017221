//! HTTP error mapping.
//!
//! Only two classes of failure leave the 200 path: malformed request
//! bodies (400) and infrastructure errors (500, logged with a correlation
//! id). Everything payment-shaped travels as a structured 200 response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// Errors surfaced as non-200 HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body is not valid JSON for the endpoint.
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    /// The referenced resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let correlation_id = correlation_id();
            error!(correlation_id = %correlation_id, error = %self, "request failed");
            let body = serde_json::json!({
                "error": "internal error",
                "correlationId": correlation_id,
            });
            return (status, axum::Json(body)).into_response();
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// Correlation identifier for 500 responses.
fn correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_unique() {
        let a = correlation_id();
        let b = correlation_id();
        assert_ne!(a, b);
    }
}
