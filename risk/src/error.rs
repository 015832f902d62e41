//! Error types for the risk analytics engine

use thiserror::Error;

/// Errors that can occur in risk calculations and orchestration
#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid confidence level: {0} (must be between 0 and 1)")]
    InvalidConfidenceLevel(f64),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Matrix operation failed: {0}")]
    MatrixError(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RiskError {
    pub(crate) fn insufficient(required: usize, actual: usize) -> Self {
        RiskError::InsufficientData { required, actual }
    }

    /// Check if the error signals a short or empty input series
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, RiskError::InsufficientData { .. })
    }

    /// Check if a documented default may be substituted for this error
    ///
    /// Short series and numerical failures are recovered locally; invalid
    /// parameters and collaborator failures are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RiskError::InsufficientData { .. }
                | RiskError::ComputationError(_)
                | RiskError::MatrixError(_)
        )
    }
}

pub type RiskResult<T> = std::result::Result<T, RiskError>;

/// Validate a confidence level lies strictly inside (0, 1)
pub(crate) fn check_confidence(confidence_level: f64) -> RiskResult<()> {
    if confidence_level > 0.0 && confidence_level < 1.0 {
        Ok(())
    } else {
        Err(RiskError::InvalidConfidenceLevel(confidence_level))
    }
}
