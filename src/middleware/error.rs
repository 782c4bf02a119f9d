//! Error response formatting
//!
//! Every error leaves the API with the same JSON shape: a stable error code,
//! a user-facing message, the request id and whether a retry makes sense.

use crate::error::{AppError, ErrorCode};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: ErrorCode,

    pub message: String,

    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        let details = match &error.kind {
            crate::error::AppErrorKind::Domain(crate::error::DomainError::SeatUnavailable {
                seats,
            }) => Some(serde_json::json!({ "seats": seats })),
            _ => None,
        };

        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            details,
            retryable: Some(error.is_retryable()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self.kind,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error_code = ?self.error_code(),
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

/// Wrap successful payloads in the standard envelope.
pub fn success_response<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppErrorKind, DomainError, ValidationError};

    #[test]
    fn test_error_response_from_app_error() {
        let app_error = AppError::new(AppErrorKind::Domain(DomainError::SeatUnavailable {
            seats: vec!["A1".to_string()],
        }))
        .with_request_id("req_123");

        let error_response = ErrorResponse::from_app_error(&app_error);

        assert_eq!(error_response.error, ErrorCode::SeatUnavailable);
        assert_eq!(error_response.request_id, Some("req_123".to_string()));
        assert_eq!(error_response.details, Some(serde_json::json!({"seats": ["A1"]})));
    }

    #[test]
    fn test_app_error_into_response() {
        let app_error = AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: "showId".to_string(),
            reason: "must be a UUID".to_string(),
        }));

        let response = app_error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unauthenticated_maps_to_401() {
        let response = AppError::new(AppErrorKind::Domain(DomainError::Unauthenticated)).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_request_id_header_lookup() {
        let mut headers = HeaderMap::new();
        assert_eq!(get_request_id_from_headers(&headers), None);
        headers.insert("x-request-id", "req_789".parse().unwrap());
        assert_eq!(get_request_id_from_headers(&headers), Some("req_789".to_string()));
    }
}
