//! Statistical modelling
//!
//! Seasonal ARIMA with one optional exogenous regressor, estimated without
//! numerical optimisation so that training stays deterministic:
//! - Differencing orders from unit root tests (`stationarity`)
//! - Hannan–Rissanen regression estimates (`sarimax`)
//! - Stepwise order search by AIC (`training`)

use thiserror::Error;

pub mod regression;
pub mod sarimax;
pub mod stationarity;
pub mod training;

pub use sarimax::{Prediction, SarimaOrder, SarimaxModel};
pub use training::{ModelTrainer, TrainedModel, TrainerConfig};

/// Failure of a single model fit or prediction
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("not enough observations: need {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("design matrix is singular")]
    Singular,

    #[error("non-finite value in {0}")]
    NonFinite(String),

    #[error("exogenous input mismatch: {0}")]
    ExogenousMismatch(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
