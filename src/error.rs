//! Error types for the phishnet pipeline

use std::fmt;
use thiserror::Error;

use crate::pipeline::Stage;

/// Result type alias for phishnet operations
pub type Result<T> = std::result::Result<T, PhishnetError>;

/// Coarse classification of failures, used by callers that only need to know
/// which part of the system broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Store unreachable, missing file, failed write
    Io,
    /// Schema mismatch, missing column, empty dataset, bad labels
    DataContract,
    /// Degenerate labels, empty search space, unfitted model
    Modeling,
    /// Invalid or unreadable configuration
    Config,
    /// URL feature extraction or prediction at serve time
    Serving,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "io",
            ErrorKind::DataContract => "data-contract",
            ErrorKind::Modeling => "modeling",
            ErrorKind::Config => "config",
            ErrorKind::Serving => "serving",
        };
        f.write_str(name)
    }
}

/// Main error type for phishnet
#[derive(Error, Debug)]
pub enum PhishnetError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid label {value} in column {column}")]
    InvalidLabel { column: String, value: f64 },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Feature extraction error: {0}")]
    FeatureExtraction(String),

    #[error("Prediction error: {0}")]
    PredictionError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("{stage} stage failed")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PhishnetError>,
    },
}

impl PhishnetError {
    /// Error category; stage wrappers report the kind of their cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PhishnetError::IoError(_) | PhishnetError::StoreError(_) => ErrorKind::Io,
            PhishnetError::DataError(_)
            | PhishnetError::SchemaError(_)
            | PhishnetError::EmptyDataset(_)
            | PhishnetError::ColumnNotFound(_)
            | PhishnetError::InvalidLabel { .. }
            | PhishnetError::ShapeError { .. } => ErrorKind::DataContract,
            PhishnetError::TrainingError(_)
            | PhishnetError::ModelNotFitted
            | PhishnetError::InvalidParameter { .. } => ErrorKind::Modeling,
            PhishnetError::ConfigError(_) | PhishnetError::PipelineError(_) => ErrorKind::Config,
            PhishnetError::SerializationError(_) => ErrorKind::Io,
            PhishnetError::FeatureExtraction(_) | PhishnetError::PredictionError(_) => {
                ErrorKind::Serving
            }
            PhishnetError::Stage { source, .. } => source.kind(),
        }
    }

    /// Stage that raised the error, if it passed through the orchestrator.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PhishnetError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Render the error and every cause below it on one line.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            current = cause.source();
        }
        out
    }
}

/// Attach the stage name to an error leaving a pipeline stage.
pub trait StageContext<T> {
    fn in_stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn in_stage(self, stage: Stage) -> Result<T> {
        self.map_err(|err| match err {
            already @ PhishnetError::Stage { .. } => already,
            other => PhishnetError::Stage {
                stage,
                source: Box::new(other),
            },
        })
    }
}

impl From<polars::error::PolarsError> for PhishnetError {
    fn from(err: polars::error::PolarsError) -> Self {
        PhishnetError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PhishnetError {
    fn from(err: serde_json::Error) -> Self {
        PhishnetError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for PhishnetError {
    fn from(err: serde_yaml::Error) -> Self {
        PhishnetError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for PhishnetError {
    fn from(err: bincode::Error) -> Self {
        PhishnetError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for PhishnetError {
    fn from(err: toml::de::Error) -> Self {
        PhishnetError::ConfigError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PhishnetError {
    fn from(err: ndarray::ShapeError) -> Self {
        PhishnetError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PhishnetError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PhishnetError = io_err.into();
        assert!(matches!(err, PhishnetError::IoError(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_stage_wrapping_keeps_cause() {
        let result: Result<()> = Err(PhishnetError::EmptyDataset("no rows".to_string()));
        let err = result.in_stage(Stage::Ingestion).unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Ingestion));
        assert_eq!(err.kind(), ErrorKind::DataContract);
        assert_eq!(err.chain(), "ingestion stage failed: Empty dataset: no rows");
    }

    #[test]
    fn test_stage_wrapping_is_not_nested() {
        let result: Result<()> = Err(PhishnetError::ModelNotFitted);
        let err = result
            .in_stage(Stage::Training)
            .in_stage(Stage::Validation)
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Training));
    }
}
