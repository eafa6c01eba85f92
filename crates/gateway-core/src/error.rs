//! Error taxonomy for the gateway.
//!
//! Every failure that leaves a component is one of a closed set of status
//! classes. The class decides the response code the caller sees.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias used across the gateway crates
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Closed set of status classes a [`GatewayError`] can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Malformed caller input
    BadRequest,
    /// Missing or invalid credentials
    Unauthorized,
    /// Caller is not allowed to perform the operation
    Forbidden,
    /// Unknown provider, model, or resource
    NotFound,
    /// Payload exceeds what the gateway or model accepts
    RequestTooLarge,
    /// Well-formed input that cannot be processed
    Unprocessable,
    /// Upstream, network, store, or parse failure
    Internal,
}

impl StatusClass {
    /// Numeric HTTP status code for this class
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::RequestTooLarge => 413,
            Self::Unprocessable => 422,
            Self::Internal => 500,
        }
    }

    /// Stable machine-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::RequestTooLarge => "request_too_large",
            Self::Unprocessable => "unprocessable",
            Self::Internal => "internal_server_error",
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway error with a machine-checkable status class.
///
/// Constructed at the point of failure and propagated as the sole outcome of
/// the operation. It is terminal: callers map it to a response, they do not
/// retry it.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed caller input
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message
        message: String,
    },

    /// Missing or invalid credentials
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Error message
        message: String,
    },

    /// Operation not permitted
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Error message
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message
        message: String,
    },

    /// Payload too large
    #[error("Request too large: {message}")]
    RequestTooLarge {
        /// Error message
        message: String,
    },

    /// Input cannot be processed
    #[error("Unprocessable request: {message}")]
    Unprocessable {
        /// Error message
        message: String,
    },

    /// Upstream, network, or parse failure
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Create a bad-request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a request-too-large error
    pub fn request_too_large(message: impl Into<String>) -> Self {
        Self::RequestTooLarge {
            message: message.into(),
        }
    }

    /// Create an unprocessable error
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::Unprocessable {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Status class of this error
    #[must_use]
    pub const fn status_class(&self) -> StatusClass {
        match self {
            Self::BadRequest { .. } => StatusClass::BadRequest,
            Self::Unauthorized { .. } => StatusClass::Unauthorized,
            Self::Forbidden { .. } => StatusClass::Forbidden,
            Self::NotFound { .. } => StatusClass::NotFound,
            Self::RequestTooLarge { .. } => StatusClass::RequestTooLarge,
            Self::Unprocessable { .. } => StatusClass::Unprocessable,
            Self::Internal { .. } => StatusClass::Internal,
        }
    }

    /// HTTP status code for this error
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_class().code()
    }

    /// The bare message without the class prefix
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message }
            | Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::NotFound { message }
            | Self::RequestTooLarge { message }
            | Self::Unprocessable { message }
            | Self::Internal { message } => message,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {err}"))
    }
}
