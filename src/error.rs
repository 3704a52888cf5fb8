//! Pipeline error taxonomy
//!
//! Every failure the forecasting pipeline reports to its caller. Nothing here is
//! retried automatically; re-fetching or retraining is a caller decision.

use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Series length mismatch: target has {target} points, exogenous has {exogenous}")]
    SeriesLengthMismatch { target: usize, exogenous: usize },

    #[error("Training failed: {0}")]
    TrainingFailed(String),

    #[error("Model already exists: {0}")]
    DuplicateModel(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid forecast input: {0}")]
    ForecastInput(String),

    #[error("Forecast failed: {0}")]
    ForecastFailed(String),

    #[error("Metrics undefined: {0}")]
    MetricsUndefined(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Stable, machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable(_) => "SourceUnavailableError",
            PipelineError::NoData(_) => "NoDataError",
            PipelineError::SeriesLengthMismatch { .. } => "SeriesLengthMismatchError",
            PipelineError::TrainingFailed(_) => "TrainingFailedError",
            PipelineError::DuplicateModel(_) => "DuplicateModelError",
            PipelineError::ModelNotFound(_) => "ModelNotFoundError",
            PipelineError::ForecastInput(_) => "ForecastInputError",
            PipelineError::ForecastFailed(_) => "ForecastFailedError",
            PipelineError::MetricsUndefined(_) => "MetricsUndefinedError",
            PipelineError::InvalidRequest(_) => "InvalidRequestError",
            PipelineError::Storage(_) => "StorageError",
        }
    }
}
