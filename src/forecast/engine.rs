use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{ModelBundle, Resolution};
use crate::error::{PipelineError, Result};
use crate::ml::{ModelError, Prediction};

pub const DEFAULT_HORIZON: usize = 24;
pub const DEFAULT_ALPHA: f64 = 0.1;

/// Produces n-step-ahead forecasts from a stored model bundle
#[derive(Debug, Clone, Copy)]
pub struct ForecastEngine {
    horizon: usize,
    alpha: f64,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl ForecastEngine {
    /// `confidence_level` is the interval coverage, e.g. 0.9 for 90% bounds
    pub fn new(horizon: usize, confidence_level: f64) -> Result<Self> {
        if horizon == 0 {
            return Err(PipelineError::InvalidRequest(
                "forecast horizon must be at least 1".into(),
            ));
        }
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(PipelineError::InvalidRequest(format!(
                "confidence level must lie in (0, 1), got {confidence_level}"
            )));
        }
        Ok(Self {
            horizon,
            alpha: 1.0 - confidence_level,
        })
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The `horizon` timestamps following `last`, one resolution step apart
    pub fn labels(&self, last: DateTime<Utc>, resolution: Resolution) -> Vec<DateTime<Utc>> {
        let step = resolution.step();
        (1..=self.horizon as i32).map(|k| last + step * k).collect()
    }

    /// Forecast every label stored in `bundle`. `exogenous` must hold one value per
    /// label exactly when the model was trained with a weather regressor.
    pub fn forecast(&self, bundle: &ModelBundle, exogenous: Option<&[f64]>) -> Result<Prediction> {
        let horizon = bundle.horizon();
        let prediction = bundle
            .model
            .predict(horizon, exogenous, self.alpha)
            .map_err(|e| match e {
                ModelError::ExogenousMismatch(msg) => PipelineError::ForecastInput(msg),
                other => PipelineError::ForecastFailed(other.to_string()),
            })?;

        let all_finite = prediction
            .point
            .iter()
            .chain(&prediction.lower)
            .chain(&prediction.upper)
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(PipelineError::ForecastFailed(
                "forecast contains non-finite values".into(),
            ));
        }

        debug!(
            horizon,
            order = %bundle.model.order(),
            exogenous = exogenous.is_some(),
            "forecast generated"
        );
        Ok(prediction)
    }
}
