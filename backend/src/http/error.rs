//! HTTP error handling and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::db::repository::RepositoryError;
use crate::error::{AnalysisError, ValidationError};

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Resource or analytic not found
    NotFound(String),
    /// Invalid request (validation error)
    BadRequest(String),
    /// Internal server error
    Internal(String),
    /// Failure inside an analysis run
    Analysis(AnalysisError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Analysis(e) => match e {
                AnalysisError::Validation(_) => StatusCode::BAD_REQUEST,
                AnalysisError::Compute(_) => StatusCode::BAD_GATEWAY,
                AnalysisError::Repository(r) if r.is_not_found() => StatusCode::NOT_FOUND,
                AnalysisError::Build(_) | AnalysisError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::NotFound(msg) => ApiError::new("NOT_FOUND", msg),
            AppError::BadRequest(msg) => ApiError::new("BAD_REQUEST", msg),
            AppError::Internal(msg) => ApiError::new("INTERNAL_ERROR", msg),
            AppError::Analysis(e) => {
                let code = match &e {
                    AnalysisError::Validation(_) => "VALIDATION_ERROR",
                    AnalysisError::Build(_) => "QUERY_BUILD_ERROR",
                    AnalysisError::Compute(_) => "COMPUTE_ERROR",
                    AnalysisError::Repository(r) if r.is_not_found() => "NOT_FOUND",
                    AnalysisError::Repository(_) => "REPOSITORY_ERROR",
                };
                if status.is_server_error() {
                    warn!("Analysis request failed: {}", e);
                }
                let error = ApiError::new(code, e.to_string());
                match &e {
                    AnalysisError::Validation(v) => match &v.field {
                        Some(field) => error.with_details(format!("field: {}", field)),
                        None => error,
                    },
                    _ => error,
                }
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::Analysis(err)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Analysis(err.into())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AppError::Analysis(err.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
