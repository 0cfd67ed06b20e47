//! Error handling for the Organic Certification Platform
//!
//! Business outcomes (refused transitions, threshold misses, duplicates) map to
//! 4xx responses; infrastructure failures map to 5xx.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{ChecklistKey, InspectionStatus, ValidationError};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Unknown checklist key: {0}")]
    UnknownChecklistKey(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule outcomes
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Checklist incomplete: {missing:?}")]
    IncompleteChecklist { missing: Vec<ChecklistKey> },

    #[error("Compliance score {score} is below the required {required}")]
    BelowThreshold { score: i32, required: i32 },

    #[error("Farm {farm_id} already holds an active certificate")]
    DuplicateCertificate { farm_id: i64 },

    // External collaborator errors
    #[error("Certificate rendering failed: {0}")]
    RenderingFailure(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid_transition(from: InspectionStatus, to: InspectionStatus) -> Self {
        AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Expected business outcomes, as opposed to infrastructure failures
    pub fn is_business_outcome(&self) -> bool {
        self.status_code().is_client_error()
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidToken | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AppError::Validation { .. } | AppError::UnknownChecklistKey(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. }
            | AppError::IncompleteChecklist { .. }
            | AppError::BelowThreshold { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateCertificate { .. } => StatusCode::CONFLICT,
            AppError::RenderingFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::StorageError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::UnknownChecklistKey(_) => "UNKNOWN_CHECKLIST_KEY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::IncompleteChecklist { .. } => "INCOMPLETE_CHECKLIST",
            AppError::BelowThreshold { .. } => "BELOW_THRESHOLD",
            AppError::DuplicateCertificate { .. } => "DUPLICATE_CERTIFICATE",
            AppError::RenderingFailure(_) => "RENDERING_FAILURE",
            AppError::StorageError(_) => "STORAGE_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        let message = err.to_string();
        match err {
            ValidationError::UnknownChecklistKey(key) => AppError::UnknownChecklistKey(key),
            ValidationError::IncompleteChecklist(missing) => {
                AppError::IncompleteChecklist { missing }
            }
            ValidationError::TooLong { field, .. } | ValidationError::Blank { field } => {
                AppError::Validation {
                    field: field.to_string(),
                    message,
                }
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_default();

        AppError::Validation {
            field,
            message: errors.to_string(),
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
        let status = self.status_code();

        let field = match &self {
            AppError::Validation { field, .. } => Some(field.clone()),
            AppError::UnknownChecklistKey(key) => Some(key.clone()),
            _ => None,
        };

        // Infrastructure details stay in the logs
        let message = match &self {
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalError(_) => "An internal server error occurred".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!("Request refused: {}", self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
