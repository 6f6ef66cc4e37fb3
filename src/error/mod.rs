use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use redis::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// Result type for throttle operations
pub type Result<T> = std::result::Result<T, ThrottleError>;

/// Throttle error types
#[derive(Error, Debug)]
pub enum ThrottleError {
    #[error("Invalid rate limit spec: {0}")]
    InvalidSpec(String),

    #[error("State store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unexpected state store reply: {0}")]
    StoreProtocolError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ThrottleError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ThrottleError::InvalidSpec(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ThrottleError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ThrottleError::StoreProtocolError(_) => StatusCode::BAD_GATEWAY,
            ThrottleError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ThrottleError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ThrottleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            ThrottleError::InvalidSpec(_) => "INVALID_SPEC",
            ThrottleError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            ThrottleError::StoreProtocolError(_) => "STORE_PROTOCOL_ERROR",
            ThrottleError::Config(_) => "CONFIG_ERROR",
            ThrottleError::Io(_) => "IO_ERROR",
            ThrottleError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Only store connectivity failures are worth a bounded retry by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ThrottleError::StoreUnavailable(_))
    }
}

impl From<redis::RedisError> for ThrottleError {
    fn from(err: redis::RedisError) -> Self {
        let unavailable = err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
            || matches!(
                err.kind(),
                ErrorKind::BusyLoadingError
                    | ErrorKind::TryAgain
                    | ErrorKind::ClusterDown
                    | ErrorKind::MasterDown
            );

        if unavailable {
            ThrottleError::StoreUnavailable(err.to_string())
        } else {
            ThrottleError::StoreProtocolError(err.to_string())
        }
    }
}

impl From<JsonRejection> for ThrottleError {
    fn from(rejection: JsonRejection) -> Self {
        ThrottleError::InvalidSpec(rejection.body_text())
    }
}

impl From<QueryRejection> for ThrottleError {
    fn from(rejection: QueryRejection) -> Self {
        ThrottleError::InvalidSpec(rejection.body_text())
    }
}

impl IntoResponse for ThrottleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "detail": self.to_string(),
            "error_code": self.error_code(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
