use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::error::ApiError;
use crate::{
    controller::AppState,
    domain::{parse_resolution, parse_start, parse_timeframe, Fingerprint, PLAIN_CAPABILITY},
};

/// Timestamp layout used in responses
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/meterNames", get(meter_names))
        .route("/weatherCapabilities", get(weather_capabilities))
        .route("/weatherColumns", post(weather_columns))
        .route("/singleSmartmeter", post(single_smartmeter))
        .route("/trainModel", post(train_model))
        .route("/loadModelAndPredict", post(load_model_and_predict))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

fn format_dates(dates: &[DateTime<Utc>]) -> Vec<String> {
    dates.iter().map(|d| d.format(DATE_FORMAT).to_string()).collect()
}

fn default_capability() -> String {
    PLAIN_CAPABILITY.to_string()
}

/// Meter selection shared by every model endpoint
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(min = 1))]
    pub timeframe: String,
    #[validate(length(min = 1))]
    pub resolution: String,
    #[validate(length(min = 1))]
    pub startpoint: String,
    #[serde(default = "default_capability")]
    #[validate(length(min = 1, max = 128))]
    pub weather_capability: String,
    #[serde(default)]
    #[validate(length(max = 128))]
    pub weather_column: String,
}

impl ModelRequest {
    pub fn fingerprint(&self) -> Result<Fingerprint, ApiError> {
        self.validate()?;
        let fingerprint = Fingerprint::new(
            self.name.trim(),
            parse_timeframe(&self.timeframe)?,
            parse_resolution(&self.resolution)?,
            parse_start(&self.startpoint)?,
            &self.weather_capability,
            &self.weather_column,
        );
        fingerprint.ensure_storable()?;
        Ok(fingerprint)
    }
}

pub async fn meter_names(
    State(st): State<AppState>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    Ok(Json(st.service.meter_names().await?))
}

pub async fn weather_capabilities(
    State(st): State<AppState>,
) -> Result<Json<BTreeMap<String, Vec<String>>>, ApiError> {
    Ok(Json(st.service.weather_capabilities(true).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ColumnsRequest {
    #[validate(length(min = 1, max = 128))]
    pub capability: String,
}

pub async fn weather_columns(
    State(st): State<AppState>,
    Json(req): Json<ColumnsRequest>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    req.validate()?;
    let columns = st.service.capability_columns(&req.capability).await?;
    Ok(Json(columns.into_iter().map(|c| (c.clone(), c)).collect()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SmartmeterRequest {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(min = 1))]
    pub timeframe: String,
    #[validate(length(min = 1))]
    pub resolution: String,
    #[validate(length(min = 1))]
    pub startpoint: String,
}

#[derive(Debug, Serialize)]
pub struct SmartmeterResponse {
    pub value: Vec<f64>,
    pub date: Vec<String>,
    pub name: String,
    pub timeframe: String,
    pub resolution: String,
}

pub async fn single_smartmeter(
    State(st): State<AppState>,
    Json(req): Json<SmartmeterRequest>,
) -> Result<Json<SmartmeterResponse>, ApiError> {
    req.validate()?;
    let timeframe = parse_timeframe(&req.timeframe)?;
    let resolution = parse_resolution(&req.resolution)?;
    let start = parse_start(&req.startpoint)?;

    let series = st
        .service
        .meter_series(req.name.trim(), timeframe, resolution, start)
        .await?;

    Ok(Json(SmartmeterResponse {
        value: series.values(),
        date: format_dates(&series.timestamps()),
        name: req.name,
        timeframe: timeframe.to_string(),
        resolution: resolution.to_string(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainResponse {
    pub message: String,
    pub name: String,
    pub timeframe: String,
    pub resolution: String,
    pub order: String,
    pub aic: f64,
    #[serde(rename = "fit_time")]
    pub fit_time: f64,
    pub training_points: usize,
    pub forecast_dates: Vec<String>,
}

pub async fn train_model(
    State(st): State<AppState>,
    Json(req): Json<ModelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fingerprint = req.fingerprint()?;
    let outcome = st.service.train(&fingerprint).await?;

    Ok((
        StatusCode::CREATED,
        Json(TrainResponse {
            message: "Model saved".to_string(),
            name: fingerprint.meter.clone(),
            timeframe: fingerprint.timeframe.to_string(),
            resolution: fingerprint.resolution.to_string(),
            order: outcome.order.to_string(),
            aic: outcome.aic,
            fit_time: outcome.training_duration,
            training_points: outcome.training_points,
            forecast_dates: format_dates(&outcome.forecast_labels),
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResponse {
    pub value: Vec<f64>,
    #[serde(rename = "lower_conf_values")]
    pub lower_conf_values: Vec<f64>,
    #[serde(rename = "upper_conf_values")]
    pub upper_conf_values: Vec<f64>,
    pub date: Vec<String>,
    pub real_value: Vec<f64>,
    pub aic: f64,
    pub order: String,
    #[serde(rename = "fit_time")]
    pub fit_time: f64,
    pub mean_absolute_error: Option<f64>,
    pub mean_squared_error: Option<f64>,
    pub root_mean_squared_error: Option<f64>,
    pub r2: Option<f64>,
    pub name: String,
    pub timeframe: String,
    pub resolution: String,
    pub weather_capability: String,
    pub weather_column: String,
}

pub async fn load_model_and_predict(
    State(st): State<AppState>,
    Json(req): Json<ModelRequest>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let fingerprint = req.fingerprint()?;
    let result = st.service.forecast(&fingerprint).await?;
    let metrics = result.metrics.as_ref();

    Ok(Json(ForecastResponse {
        date: format_dates(&result.labels),
        value: result.point_values,
        lower_conf_values: result.lower_bound,
        upper_conf_values: result.upper_bound,
        real_value: result.real_values,
        aic: result.aic,
        order: result.order.to_string(),
        fit_time: result.training_duration,
        mean_absolute_error: metrics.map(|m| m.mae),
        mean_squared_error: metrics.map(|m| m.mse),
        root_mean_squared_error: metrics.map(|m| m.rmse),
        r2: metrics.map(|m| m.r2),
        name: fingerprint.meter.clone(),
        timeframe: fingerprint.timeframe.to_string(),
        resolution: fingerprint.resolution.to_string(),
        weather_capability: fingerprint.weather.capability().to_string(),
        weather_column: fingerprint.weather.column().to_string(),
    }))
}
