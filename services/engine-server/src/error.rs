use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors returned by the order API.
///
/// Clients key on `error_code`: 2 = degraded, 3 = invalid argument,
/// 5 = not found.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Service is in degraded mode and can't accept new requests")]
    Degraded,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn error_code(&self) -> i32 {
        match self {
            ApiError::Degraded => 2,
            ApiError::InvalidArgument(_) => 3,
            ApiError::NotFound(_) => 5,
            ApiError::Internal(_) => 13,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Degraded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error_message": self.to_string(),
            "error_code": self.error_code(),
        }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::Degraded.error_code(), 2);
        assert_eq!(ApiError::InvalidArgument("x".into()).error_code(), 3);
        assert_eq!(ApiError::NotFound("x".into()).error_code(), 5);
    }

    #[test]
    fn test_degraded_message_is_stable() {
        assert_eq!(
            ApiError::Degraded.to_string(),
            "Service is in degraded mode and can't accept new requests"
        );
    }
}
