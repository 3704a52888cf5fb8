use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::PipelineError;

/// Failure of a `/waterdemand` handler
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// `{error, message}` body of every non-2xx response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(e) => match e {
                PipelineError::NoData(_) | PipelineError::ModelNotFound(_) => StatusCode::NOT_FOUND,
                PipelineError::DuplicateModel(_) => StatusCode::CONFLICT,
                PipelineError::InvalidRequest(_) | PipelineError::ForecastInput(_) => {
                    StatusCode::BAD_REQUEST
                }
                PipelineError::SeriesLengthMismatch { .. } | PipelineError::MetricsUndefined(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                PipelineError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                PipelineError::TrainingFailed(_)
                | PipelineError::ForecastFailed(_)
                | PipelineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Kind reported in the `error` field
    fn error_type(&self) -> &'static str {
        match self {
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::Pipeline(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = match &self {
            ApiError::Pipeline(PipelineError::Storage(_)) => {
                tracing::error!(error = %self, "model storage failure");
                "model storage is unavailable".to_string()
            }
            _ if status.is_server_error() => {
                tracing::warn!(error = %self, kind = error_type, "request failed");
                self.to_string()
            }
            _ => {
                tracing::debug!(error = %self, kind = error_type, "request rejected");
                self.to_string()
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}
