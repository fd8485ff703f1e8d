use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComplianceError {
    /// Malformed or missing rule/format definitions.
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Unknown rule: {0}")]
    UnknownRule(String),
    #[error("Unknown format: {0}")]
    UnknownFormat(String),
    #[error("Unknown jurisdiction: {0}")]
    UnknownJurisdiction(String),
    /// A detector or analyzer produced NaN or out-of-range values.
    #[error("Measurement error: {0}")]
    MeasurementError(String),
    /// A single correction operation faulted.
    #[error("Operation failure: {0}")]
    OperationFailure(String),
    /// Null or zero-size image buffers.
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ComplianceError {
    fn from(err: std::io::Error) -> Self {
        ComplianceError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ComplianceError {
    fn from(err: serde_json::Error) -> Self {
        ComplianceError::ConfigError(err.to_string())
    }
}

impl From<image::ImageError> for ComplianceError {
    fn from(err: image::ImageError) -> Self {
        ComplianceError::InvalidImage(err.to_string())
    }
}
