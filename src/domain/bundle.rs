use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ml::SarimaxModel;

/// Artifact of one training run. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub model: SarimaxModel,
    /// Wall-clock fitting time in seconds
    pub training_duration: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Timestamps the stored model forecasts for
    pub forecast_labels: Vec<DateTime<Utc>>,
    /// Real observations for the leading forecast labels, disjoint from training data
    pub held_out_real_values: Vec<f64>,
}

impl ModelBundle {
    pub fn horizon(&self) -> usize {
        self.forecast_labels.len()
    }
}
