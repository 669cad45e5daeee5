//! Error taxonomy for the enrollment core and its HTTP edge.
//!
//! - [`Rejection`]: a business rule refused the request. Recoverable, shown verbatim.
//! - [`AppError::InvalidArgument`]: the caller sent a value the core never accepts.
//! - [`StoreError`]: the persistence layer failed. Fatal to the current operation.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

/// Why Admission Control refused an enrollment. The `Display` text is user-facing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rejection {
    #[error("module archived")]
    ModuleArchived,
    #[error("already enrolled")]
    AlreadyEnrolled,
    #[error("student at max active enrollments")]
    StudentAtCapacity,
    #[error("module at max capacity")]
    ModuleAtCapacity,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::ModuleArchived => "MODULE_ARCHIVED",
            Rejection::AlreadyEnrolled => "ALREADY_ENROLLED",
            Rejection::StudentAtCapacity => "STUDENT_AT_CAPACITY",
            Rejection::ModuleAtCapacity => "MODULE_AT_CAPACITY",
        }
    }
}

/// Persistence failures. Never retried.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unit of work already committed")]
    Closed,
}

/// Application error returned by the core operations and the HTTP handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Store(StoreError::Database(err))
    }
}

/// Error response body for HTTP
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl AppError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Rejected(reason) => reason.code(),
            AppError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Rejected(_) => StatusCode::CONFLICT,
            AppError::InvalidArgument(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-facing message. Storage details are logged, never returned.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Store(e) => {
                tracing::error!("store error: {:?}", e);
                "A storage error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.user_message(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}
