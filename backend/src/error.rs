//! Error taxonomy for request validation, query building and computation.
//!
//! Repository failures live in [`crate::db::repository::RepositoryError`];
//! [`AnalysisError`] is the umbrella every handler, the compute engine and
//! every analyzer returns.

use crate::db::repository::RepositoryError;

/// Result type used across the compute and analyzer layers.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Result type for backend calls.
pub type ComputeResult<T> = Result<T, ComputeError>;

/// Malformed or incomplete analytic request. Never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Validation error{}: {message}", field.as_ref().map(|f| format!(" on '{}'", f)).unwrap_or_default())]
pub struct ValidationError {
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

/// A query that cannot be turned into backend SQL.
///
/// Raised before any backend call is issued.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("No AOI ids were requested")]
    EmptyAoiIds,

    #[error("Field '{field}' cannot be resolved to a column of '{dataset}'")]
    UnresolvedField { dataset: String, field: String },

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Operator '{operator}' cannot take value {value}")]
    InvalidOperand { operator: String, value: String },

    #[error("Filter on '{0}' has an empty value list")]
    EmptyValueList(String),
}

/// A backend returned a non-success status, an unusable payload, or could
/// not be reached. Propagated as-is; retry policy belongs to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("{backend} returned status {status}: {detail}")]
    Backend {
        backend: String,
        status: u16,
        detail: String,
    },

    #[error("{backend} returned a malformed payload: {detail}")]
    MalformedPayload { backend: String, detail: String },

    #[error("{backend} request failed: {detail}")]
    Transport { backend: String, detail: String },

    #[error("Credentials unavailable: {0}")]
    Credentials(String),
}

impl ComputeError {
    pub fn malformed(backend: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedPayload {
            backend: backend.into(),
            detail: detail.into(),
        }
    }

    pub fn transport(backend: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            backend: backend.into(),
            detail: err.to_string(),
        }
    }
}

/// Umbrella error for analytic requests.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AnalysisError {
    /// True when a stored analysis was requested but does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AnalysisError::Repository(e) if e.is_not_found())
    }
}
