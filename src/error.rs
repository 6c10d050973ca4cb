//! Error types for the cache and resilience layer
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Error code attached to failures raised by the connectivity probe.
pub const OFFLINE_CODE: &str = "OFFLINE";

// == Remote Error ==
/// Failure reported by a remote operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    /// Backend error code, if the backend supplied one
    pub code: Option<String>,
    /// Human readable message
    pub message: String,
}

impl RemoteError {
    /// Creates an error without a code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates an error carrying a backend code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Connectivity failure raised before an attempt when the client is offline.
    pub fn offline() -> Self {
        Self::with_code(OFFLINE_CODE, "No network connection")
    }

    /// Returns true for failures produced by the connectivity probe.
    pub fn is_offline(&self) -> bool {
        self.code.as_deref() == Some(OFFLINE_CODE)
    }
}

// == Resilience Error ==
/// Terminal failure surfaced by the resilient executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResilienceError {
    /// Unwrapped remote failure (circuit breaker used without retry)
    #[error("{operation} failed: {source}")]
    Remote {
        operation: String,
        #[source]
        source: RemoteError,
    },

    /// Failure from the non-retriable allowlist, surfaced without retrying
    #[error("{operation} failed: {source}")]
    NonRetriable {
        operation: String,
        #[source]
        source: RemoteError,
    },

    /// Every retry attempt failed
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    /// Circuit breaker is open; the operation was not invoked
    #[error("{operation} is temporarily unavailable, try again in {} seconds", retry_in_secs(.retry_in))]
    CircuitOpen {
        operation: String,
        retry_in: Duration,
    },

    /// A half-open probe is already in flight; the operation was not invoked
    #[error("{operation} is recovering, try again shortly")]
    ProbeInFlight { operation: String },

    /// A pending retry was cancelled by `cleanup`
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },
}

impl ResilienceError {
    /// Operation label the error refers to.
    pub fn operation(&self) -> &str {
        match self {
            ResilienceError::Remote { operation, .. }
            | ResilienceError::NonRetriable { operation, .. }
            | ResilienceError::Exhausted { operation, .. }
            | ResilienceError::CircuitOpen { operation, .. }
            | ResilienceError::ProbeInFlight { operation }
            | ResilienceError::Cancelled { operation } => operation,
        }
    }

    /// Underlying remote failure, if the operation was reached.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            ResilienceError::Remote { source, .. }
            | ResilienceError::NonRetriable { source, .. }
            | ResilienceError::Exhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the failure says anything about the remote service's health.
    ///
    /// Non-retriable answers (not found, unauthorized, ...) prove the service
    /// responded; local rejections and cancellations never reached it.
    pub(crate) fn is_service_failure(&self) -> bool {
        matches!(
            self,
            ResilienceError::Remote { .. } | ResilienceError::Exhausted { .. }
        )
    }

    /// Description suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            ResilienceError::Exhausted {
                operation, source, ..
            } if source.is_offline() => {
                format!("Could not complete \"{operation}\": you appear to be offline.")
            }
            ResilienceError::Exhausted { operation, .. } | ResilienceError::Remote { operation, .. } => {
                format!("Could not complete \"{operation}\". Please try again later.")
            }
            other => other.to_string(),
        }
    }
}

fn retry_in_secs(retry_in: &Duration) -> u64 {
    // Round up so "0 seconds" is never shown while still open
    let millis = retry_in.as_millis() as u64;
    millis.div_ceil(1000)
}

// == Config Error ==
/// Invalid configuration supplied by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A domain was requested with a different value type than it was created with
    #[error("Cache domain '{0}' is registered with a different value type")]
    DomainTypeMismatch(String),
}

// == API Error ==
/// Errors returned by the diagnostics HTTP surface.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown cache domain
    #[error("Unknown cache domain: {0}")]
    UnknownDomain(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownDomain(_) => StatusCode::NOT_FOUND,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for resilient operations.
pub type Result<T> = std::result::Result<T, ResilienceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_error_is_tagged() {
        assert!(RemoteError::offline().is_offline());
        assert!(!RemoteError::new("boom").is_offline());
    }

    #[test]
    fn test_circuit_open_message_rounds_up() {
        let err = ResilienceError::CircuitOpen {
            operation: "load payments".to_string(),
            retry_in: Duration::from_millis(12_001),
        };
        assert_eq!(
            err.to_string(),
            "load payments is temporarily unavailable, try again in 13 seconds"
        );
    }

    #[test]
    fn test_exhausted_names_operation_and_attempts() {
        let err = ResilienceError::Exhausted {
            operation: "save student".to_string(),
            attempts: 4,
            source: RemoteError::new("timeout"),
        };
        assert_eq!(err.to_string(), "save student failed after 4 attempts: timeout");
        assert_eq!(err.operation(), "save student");
        assert!(err.user_message().contains("save student"));
    }

    #[test]
    fn test_user_message_for_offline_exhaustion() {
        let err = ResilienceError::Exhausted {
            operation: "sync".to_string(),
            attempts: 2,
            source: RemoteError::offline(),
        };
        assert!(err.user_message().contains("offline"));
    }

    #[test]
    fn test_service_failure_classification() {
        let remote = RemoteError::new("x");
        assert!(ResilienceError::Remote {
            operation: "a".into(),
            source: remote.clone()
        }
        .is_service_failure());
        assert!(!ResilienceError::NonRetriable {
            operation: "a".into(),
            source: remote
        }
        .is_service_failure());
        assert!(!ResilienceError::Cancelled {
            operation: "a".into()
        }
        .is_service_failure());
    }
}
