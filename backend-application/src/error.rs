use thiserror::Error;

use backend_domain::{DetectionError, StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
            StoreError::Conflict { .. } => AppError::Conflict(err.to_string()),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<DetectionError> for AppError {
    fn from(err: DetectionError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Run-level faults. Per-account problems never surface here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("account selection failed: {0}")]
    StoreUnavailable(#[source] StoreError),
    #[error("another detection run holds the lease")]
    AlreadyRunning,
    #[error("run lease error: {0}")]
    Lease(#[source] anyhow::Error),
}

impl From<RunError> for AppError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::AlreadyRunning => AppError::Conflict(err.to_string()),
            other => AppError::Internal(other.into()),
        }
    }
}
