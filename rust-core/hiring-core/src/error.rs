//! # Error Handling
//!
//! Centralized error types for the hiring API core.
//! Uses `thiserror` for ergonomic error definitions.

use crate::database::Role;
use crate::validation::ValidationErrors;
use hyper::StatusCode;
use thiserror::Error;

/// Result type alias for hiring API operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the hiring API
#[derive(Error, Debug)]
pub enum Error {
    /// One or more required settings are missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(ValidationErrors),

    /// A pool for the given role could not be built or reached
    #[error("Connection error ({role}): {message}")]
    Connection {
        /// Role of the pool that failed
        role: Role,
        /// Underlying failure description
        message: String,
    },

    /// The pool for the given role was never initialized
    #[error("No {role} pool is initialized")]
    PoolUnavailable {
        /// Role that was requested
        role: Role,
    },

    /// An operation tag outside the supported set was requested
    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation {
        /// The rejected operation tag
        operation: String,
    },

    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// No route is bound to the requested path
    #[error("No route found for path: {path}")]
    RouteNotFound {
        /// The path that wasn't matched
        path: String,
    },

    /// Route metadata could not be turned into a path
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },

    /// Request input failed validation
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Credentials are missing or were rejected
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        /// Why the credentials were rejected
        reason: String,
    },

    /// The request conflicts with existing state
    #[error("Conflict: {message}")]
    Conflict {
        /// Conflict description
        message: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status a request-time error maps to
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn connection(role: Role, message: impl std::fmt::Display) -> Self {
        Self::Connection {
            role,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::FieldError;

    #[test]
    fn test_route_not_found_error() {
        let err = Error::RouteNotFound {
            path: "/unknown".to_string(),
        };
        assert!(err.to_string().contains("/unknown"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_bind_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = Error::BindError {
            address: "0.0.0.0:8000".to_string(),
            source: io_err,
        };
        assert!(err.to_string().contains("0.0.0.0:8000"));
    }

    #[test]
    fn test_connection_error_names_role() {
        let err = Error::connection(Role::Write, "timed out");
        assert_eq!(err.to_string(), "Connection error (write): timed out");
    }

    #[test]
    fn test_status_mapping() {
        let mut errors = ValidationErrors::new();
        errors.add(FieldError::required("email"));
        assert_eq!(
            Error::Validation(errors).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Unauthorized {
                reason: "no token".into()
            }
            .status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::Conflict {
                message: "email taken".into()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::PoolUnavailable { role: Role::Read }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
