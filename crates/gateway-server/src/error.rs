//! API error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::{GatewayError, StatusClass};
use serde::Serialize;

/// Error returned by a handler
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Response status
    pub status: StatusCode,
    /// Human-readable message
    pub message: String,
    /// Machine-readable class name
    pub error_type: &'static str,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    message: &'a str,
    #[serde(rename = "type")]
    error_type: &'a str,
    code: u16,
}

impl ApiError {
    fn new(class: StatusClass, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(class.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: message.into(),
            error_type: class.as_str(),
        }
    }

    /// 400
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusClass::BadRequest, message)
    }

    /// 404
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusClass::NotFound, message)
    }

    /// 500
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusClass::Internal, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ApiError {}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self::new(err.status_class(), err.message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                message: &self.message,
                error_type: self.error_type,
                code: self.status.as_u16(),
            },
        };
        (self.status, Json(body)).into_response()
    }
}
