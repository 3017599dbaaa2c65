use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::protocol::ErrorBody;

/// Terminal outcomes of a relay request. The display text carries internal
/// detail for logs; clients only ever see `public_message`.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Rate limit exceeded for client {0}")]
    RateLimited(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            RelayError::MethodNotAllowed(_) => "Method not allowed",
            RelayError::RateLimited(_) => "Too many requests. Please wait a moment and try again.",
            RelayError::InvalidRequest(_) => "Invalid request format",
            RelayError::UpstreamUnavailable(_) => {
                "AI service temporarily unavailable. Please try again later."
            }
            RelayError::Internal(_) => "Something went wrong. Please try again.",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (RelayError::MethodNotAllowed("GET".into()), 405),
            (RelayError::RateLimited("1.2.3.4".into()), 429),
            (RelayError::InvalidRequest("empty".into()), 400),
            (RelayError::UpstreamUnavailable("503".into()), 502),
            (RelayError::Internal("boom".into()), 500),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status().as_u16(), expected, "{}", err);
        }
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = RelayError::UpstreamUnavailable("401 invalid x-api-key sk-secret".into());
        assert_eq!(
            err.public_message(),
            "AI service temporarily unavailable. Please try again later."
        );
        assert!(!err.public_message().contains("sk-secret"));

        let err = RelayError::Internal("connection reset by peer".into());
        assert_eq!(err.public_message(), "Something went wrong. Please try again.");
    }

    #[test]
    fn test_into_response_status() {
        let response = RelayError::RateLimited("unknown".into()).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
