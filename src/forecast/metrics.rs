//! Accuracy of a forecast against held-out readings

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

/// Error summary of one evaluated forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    /// Coefficient of determination; 1 for an exact fit of a constant series
    pub r2: f64,
    pub sample_count: usize,
}

impl ForecastMetrics {
    /// Both slices must be finite, of equal length and hold at least two values
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self, ForecastMetricsError> {
        if actual.len() != predicted.len() {
            return Err(ForecastMetricsError::LengthMismatch {
                real: actual.len(),
                forecast: predicted.len(),
            });
        }
        if actual.len() < 2 {
            return Err(ForecastMetricsError::TooFewSamples(actual.len()));
        }
        if actual.iter().chain(predicted).any(|v| !v.is_finite()) {
            return Err(ForecastMetricsError::NonFinite);
        }

        let n = actual.len() as f64;
        let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let residual_variance: f64 = errors.iter().map(|e| e * e).sum();
        let mse = residual_variance / n;
        let rmse = mse.sqrt();

        let mean = actual.iter().sum::<f64>() / n;
        let total_sum_squares: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

        let r2 = if total_sum_squares > 0.0 {
            1.0 - residual_variance / total_sum_squares
        } else if residual_variance == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(ForecastMetrics {
            mae,
            mse,
            rmse,
            r2,
            sample_count: actual.len(),
        })
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mae {:.3} mse {:.3} rmse {:.3} r2 {:.3} over {} values",
            self.mae, self.mse, self.rmse, self.r2, self.sample_count
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ForecastMetricsError {
    #[error("{real} real values for {forecast} forecast values")]
    LengthMismatch { real: usize, forecast: usize },

    #[error("At least two samples are required, got {0}")]
    TooFewSamples(usize),

    #[error("Non-finite value in evaluated data")]
    NonFinite,
}

impl From<ForecastMetricsError> for PipelineError {
    fn from(err: ForecastMetricsError) -> Self {
        PipelineError::MetricsUndefined(err.to_string())
    }
}

/// Evaluate `predicted` against `real`
pub fn evaluate(real: &[f64], predicted: &[f64]) -> crate::error::Result<ForecastMetrics> {
    Ok(ForecastMetrics::calculate(real, predicted)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_forecast() {
        let metrics = evaluate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();

        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.mse, 0.0);
        assert_eq!(metrics.rmse, 0.0);
        assert_eq!(metrics.r2, 1.0);
        assert_eq!(metrics.sample_count, 3);
    }

    #[test]
    fn test_daily_demand_errors() {
        let metrics = ForecastMetrics::calculate(&[40.0, 44.0, 52.0, 48.0], &[42.0, 43.0, 50.0, 49.0])
            .unwrap();

        assert_eq!(metrics.mae, 1.5);
        assert_eq!(metrics.mse, 2.5);
        assert!((metrics.rmse - 2.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(metrics.r2, 0.875);
    }

    #[test]
    fn test_constant_actuals() {
        let exact = ForecastMetrics::calculate(&[4.0, 4.0], &[4.0, 4.0]).unwrap();
        assert_eq!(exact.r2, 1.0);

        let off = ForecastMetrics::calculate(&[4.0, 4.0], &[3.0, 5.0]).unwrap();
        assert_eq!(off.r2, 0.0);
        assert_eq!(off.mse, 1.0);
    }

    #[test]
    fn test_length_mismatch() {
        let err = evaluate(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
        assert_eq!(err.kind(), "MetricsUndefinedError");
    }

    #[test]
    fn test_single_sample_is_undefined() {
        let err = evaluate(&[1.0], &[1.0]).unwrap_err();
        assert_eq!(err.kind(), "MetricsUndefinedError");
        assert!(evaluate(&[], &[]).is_err());
    }
}
