use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectionError {
    #[error("account has no transactions to score")]
    InsufficientHistory,
    #[error("insufficient data for model fitting: {have} points, need {need}")]
    InsufficientData { have: usize, need: usize },
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DetectionError {
    /// Skips are expected outcomes, not processing faults.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            DetectionError::InsufficientHistory | DetectionError::InsufficientData { .. }
        )
    }
}
