//! Per-meter water demand forecasting.
//!
//! Readings are resampled to a fixed cadence, optionally aligned with a weather
//! covariate, fitted with a seasonal ARIMA model and cached on disk under a
//! deterministic key. Cached models serve forecasts with confidence bounds and
//! accuracy metrics against held-out readings.

pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ml;
pub mod repo;
pub mod series;
pub mod telemetry;
