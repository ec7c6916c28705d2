use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::crypto::attendance::AttendanceTokenError;
use crate::crypto::csrf::CsrfRejection;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The connection pool could not be built.
    #[error("Pool configuration error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No valid session accompanied the request.
    #[error("Authentication required")]
    Unauthenticated,

    /// An authorization error.
    #[error("Authorization failed")]
    Forbidden,

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// The request conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The double-submit CSRF check rejected the request.
    #[error("CSRF check failed: {0}")]
    Csrf(#[from] CsrfRejection),

    /// An attendance token could not be accepted.
    #[error("Attendance token rejected: {0}")]
    AttendanceToken(#[from] AttendanceTokenError),

    /// A row was missing a column we expected.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

/// The JSON body sent for every error response.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<i64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut event_id = None;

        let (status, code, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "DATABASE_UNAVAILABLE", "Database unavailable".to_string())
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Pool configuration error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string())
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR", "Cache error".to_string())
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED", msg.clone())
            }

            AppError::Unauthenticated => {
                tracing::debug!("Request without a valid session");
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", "Authentication required".to_string())
            }

            AppError::Forbidden => {
                tracing::warn!("Authorization failed");
                (StatusCode::FORBIDDEN, "FORBIDDEN", "Forbidden".to_string())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found".to_string())
            }

            AppError::Conflict(ref msg) => {
                tracing::debug!("Conflict: {}", msg);
                (StatusCode::CONFLICT, "CONFLICT", msg.clone())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }

            AppError::Csrf(rejection) => {
                tracing::warn!("CSRF rejection: {}", rejection.code());
                (StatusCode::FORBIDDEN, rejection.code(), rejection.to_string())
            }

            AppError::AttendanceToken(ref err) => {
                tracing::debug!("Attendance token rejected: {}", err.code());
                if let AttendanceTokenError::Expired { event_id: id } = err {
                    event_id = Some(*id);
                }
                (StatusCode::BAD_REQUEST, err.code(), err.to_string())
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Missing column in row: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal server error".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal server error".to_string())
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", msg.clone())
            }
        };

        let body = sonic_rs::to_string(&ErrorBody {
            error: message,
            code,
            event_id,
        })
        .unwrap_or_else(|_| r#"{"error":"Internal server error","code":"INTERNAL_ERROR"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
