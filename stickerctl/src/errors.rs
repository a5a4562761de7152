use crate::db::errors::DbError;
use crate::db::models::credits::CreditRequestStatus;
use crate::generation::GenerationError;
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

/// Message shared by every credential failure, so callers cannot tell an unknown email from a bad password
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided, or the session is no longer valid
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Email/password pair did not verify
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Authenticated user lacks the required role
    #[error("Forbidden")]
    Forbidden,

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Email already registered to another account
    #[error("An account with this email address already exists")]
    DuplicateIdentity,

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Balance does not cover the requested debit
    #[error("Insufficient balance: have {balance}, need {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    /// Top-up amount outside the allowed bounds or not a multiple of the step
    #[error("Invalid amount {amount}: must be a multiple of {step} between {min} and {max}")]
    InvalidAmount { amount: i64, min: i64, max: i64, step: i64 },

    /// Credit request already reached a terminal state
    #[error("Credit request already {status}")]
    AlreadyResolved { status: CreditRequestStatus },

    /// External generation provider failed
    #[error(transparent)]
    Provider(#[from] GenerationError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Store operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } | Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } | Error::InvalidAmount { .. } => StatusCode::BAD_REQUEST,
            Error::DuplicateIdentity | Error::AlreadyResolved { .. } => StatusCode::CONFLICT,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unauthenticated { .. } => "unauthenticated",
            Error::InvalidCredentials => "invalid_credentials",
            Error::Forbidden => "forbidden",
            Error::BadRequest { .. } => "invalid_input",
            Error::DuplicateIdentity => "duplicate_identity",
            Error::NotFound { .. } => "not_found",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::InvalidAmount { .. } => "invalid_amount",
            Error::AlreadyResolved { .. } => "already_resolved",
            Error::Provider(_) => "provider_error",
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "not_found",
                DbError::UniqueViolation { .. } if db_err.is_duplicate_email() => "duplicate_identity",
                DbError::UniqueViolation { .. } => "conflict",
                DbError::CheckViolation { .. } => "invalid_input",
                DbError::Other(_) => "internal",
            },
            Error::Internal { .. } | Error::Other(_) => "internal",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden => "You do not have permission to perform this action".to_string(),
            Error::Provider(_) => "Image generation failed".to_string(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } if db_err.is_duplicate_email() => Error::DuplicateIdentity.to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Provider(_) => {
                tracing::warn!("Generation provider error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InvalidCredentials | Error::Forbidden => {
                tracing::info!("Authorization error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let mut body = json!({
            "kind": self.kind(),
            "message": self.user_message(),
        });
        match &self {
            Error::InsufficientBalance { balance, requested } => {
                body["balance"] = json!(balance);
                body["requested"] = json!(requested);
            }
            Error::InvalidAmount { min, max, step, .. } => {
                body["allowed"] = json!({ "min": min, "max": max, "step": step });
            }
            Error::AlreadyResolved { status } => {
                body["status"] = json!(status);
            }
            _ => {}
        }

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
