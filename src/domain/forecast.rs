use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::forecast::ForecastMetrics;
use crate::ml::SarimaOrder;

/// Point forecasts and confidence bounds, indexed by `labels`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub labels: Vec<DateTime<Utc>>,
    pub point_values: Vec<f64>,
    pub lower_bound: Vec<f64>,
    pub upper_bound: Vec<f64>,
    /// Held-out observations compared against the leading forecasts
    pub real_values: Vec<f64>,
    /// Present once the evaluator could run (at least two held-out values)
    pub metrics: Option<ForecastMetrics>,
    pub aic: f64,
    pub order: SarimaOrder,
    pub training_duration: f64,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.point_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point_values.is_empty()
    }
}
