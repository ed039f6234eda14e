use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing, invalid or expired credentials/session.
    #[error("Unauthorized")]
    Unauthorized,

    /// CSRF token missing or mismatched.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Login abuse threshold exceeded.
    #[error("Rate limit exceeded")]
    RateLimited {
        /// Seconds the client should wait before retrying.
        retry_after_secs: u64,
    },

    /// The upstream API could not be reached.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream API did not answer within the configured timeout.
    #[error("Upstream timeout")]
    UpstreamTimeout,

    /// No session with the given identifier.
    #[error("Session not found")]
    SessionNotFound,

    /// The session exists but its expiry has passed.
    #[error("Session expired")]
    SessionExpired,

    /// The session identifier has an invalid lexical shape.
    #[error("Invalid session ID")]
    InvalidSessionId,

    /// A persisted record failed authentication or decoding.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A malformed request body or parameter.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An encryption or decryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Session shape/lookup/decrypt failures all collapse into one generic
        // 401 so a caller cannot distinguish "expired" from "never existed"
        // from "tampered".
        let (status, message, retry_after) = match self {
            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
            }

            AppError::Unauthorized
            | AppError::SessionNotFound
            | AppError::SessionExpired
            | AppError::InvalidSessionId => {
                tracing::warn!("Authentication failed: {}", self);
                (
                    StatusCode::UNAUTHORIZED,
                    "unauthorized: invalid or expired session".to_string(),
                    None,
                )
            }

            AppError::Forbidden(ref msg) => {
                tracing::warn!("CSRF rejection: {}", msg);
                (StatusCode::FORBIDDEN, format!("forbidden: {}", msg), None)
            }

            AppError::RateLimited { retry_after_secs } => {
                tracing::warn!("Rate limit exceeded, retry after {}s", retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "too many login attempts, please try again later".to_string(),
                    Some(retry_after_secs),
                )
            }

            AppError::UpstreamUnavailable(ref detail) => {
                tracing::error!("Upstream connection failed: {}", detail);
                (StatusCode::BAD_GATEWAY, "upstream connection failed".to_string(), None)
            }

            AppError::UpstreamTimeout => {
                tracing::error!("Upstream timeout");
                (StatusCode::GATEWAY_TIMEOUT, "upstream timeout".to_string(), None)
            }

            AppError::Corrupt(ref detail) => {
                tracing::error!("Corrupt record: {}", detail);
                (
                    StatusCode::UNAUTHORIZED,
                    "unauthorized: invalid or expired session".to_string(),
                    None,
                )
            }

            AppError::InvalidInput(ref msg) => {
                tracing::debug!("Invalid input: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone(), None)
            }

            AppError::Encryption(ref detail) => {
                tracing::error!("Encryption error: {}", detail);
                (
                    StatusCode::UNAUTHORIZED,
                    "unauthorized: invalid or expired session".to_string(),
                    None,
                )
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        if let Some(secs) = retry_after {
            if let Ok(value) = http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}
