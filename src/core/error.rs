use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::shared::types::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Source IP is not allow-listed")]
    IpNotAllowed,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Insufficient role for this operation")]
    InsufficientRole,

    #[error("Admin session has expired, re-authentication required")]
    SessionExpired,

    #[error("A one-time code is required for this operation")]
    StepUpRequired,

    #[error("Invalid one-time code")]
    InvalidStepUpCode,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Encrypted envelope failed integrity verification")]
    IntegrityFailure,

    #[error("Encrypted envelope is older than the staleness bound")]
    ExpiredEnvelope,
}

impl AppError {
    /// Stable machine-readable code carried in every error response.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "INTERNAL_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Auth(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::IpNotAllowed => "IP_NOT_ALLOWED",
            AppError::AccountDisabled => "ACCOUNT_DISABLED",
            AppError::InsufficientRole => "INSUFFICIENT_ROLE",
            AppError::SessionExpired => "SESSION_EXPIRED",
            AppError::StepUpRequired => "STEP_UP_REQUIRED",
            AppError::InvalidStepUpCode => "INVALID_STEP_UP_CODE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::DuplicateKey(_) => "DUPLICATE_KEY",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            AppError::IntegrityFailure => "INTEGRITY_FAILURE",
            AppError::ExpiredEnvelope => "ENVELOPE_EXPIRED",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Auth(ref msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(ref msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::IpNotAllowed | AppError::AccountDisabled | AppError::InsufficientRole => {
                (StatusCode::FORBIDDEN, self.to_string())
            }
            AppError::SessionExpired => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::StepUpRequired | AppError::InvalidStepUpCode => {
                (StatusCode::FORBIDDEN, self.to_string())
            }
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::DuplicateKey(ref msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::ExternalServiceError(ref msg) => {
                tracing::error!("External service error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            AppError::IntegrityFailure | AppError::ExpiredEnvelope => {
                // Vault decrypt failures are fatal; no detail beyond the code
                // leaves the process.
                tracing::error!("Vault decrypt failure: {}", code);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(ApiResponse::<()>::error(code, Some(message)));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
