//! Error handling for the stock ledger engine
//!
//! Provides consistent JSON error responses for every failure kind

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Input errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // External inventory API errors
    #[error("External API rejected credentials: {0}")]
    Auth(String),

    #[error("External API rate limit exceeded after {attempts} attempts")]
    RateLimit { attempts: u32 },

    #[error("External service error: {0}")]
    ExternalService(String),

    // Reconciliation errors
    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Conflict resolution failed: {0}")]
    ConflictResolution(String),

    #[error("Target {0} is already being synchronized")]
    LockContention(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Errors that make the rest of a sync pass pointless
    pub fn aborts_sync(&self) -> bool {
        matches!(
            self,
            AppError::Auth(_) | AppError::RateLimit { .. } | AppError::Cancelled
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::Auth(_) => "EXTERNAL_AUTH_ERROR",
            AppError::RateLimit { .. } => "EXTERNAL_RATE_LIMITED",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::Mapping(_) => "MAPPING_ERROR",
            AppError::ConflictResolution(_) => "CONFLICT_RESOLUTION_ERROR",
            AppError::LockContention(_) => "LOCK_CONTENTION",
            AppError::Cancelled => "CANCELLED",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        match errors.field_errors().into_iter().next() {
            Some((field, errs)) => {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                AppError::validation(field, message)
            }
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::LockContention(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidStateTransition(_)
            | AppError::Mapping(_)
            | AppError::ConflictResolution(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Auth(_) | AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::RateLimit { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            AppError::Validation { message, .. } => message.clone(),
            AppError::NotFound(resource) => format!("{} not found", resource),
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            other => other.to_string(),
        };

        let field = match &self {
            AppError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        let detail = ErrorDetail {
            code: self.code().to_string(),
            message,
            field,
        };
        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
