//! Weather observations from a DWD-style station API
//!
//! The station endpoint lists capabilities (data types) with their resolution and
//! availability window; each capability serves hourly records of several columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::WeatherConfig;
use crate::domain::{Observation, Series};
use crate::error::{PipelineError, Result};

/// Seconds of data requested when probing a capability for its columns
const COLUMN_PROBE_SECONDS: i64 = 60;

/// Provider of exogenous weather series
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Raw observations of `column` between two unix timestamps (inclusive)
    async fn fetch(
        &self,
        capability: &str,
        column: &str,
        start_unix: i64,
        end_unix: i64,
    ) -> Result<Series>;

    /// Capabilities usable for training
    async fn capabilities(&self) -> Result<Vec<String>>;

    /// Columns served by `capability`
    async fn columns(&self, capability: &str) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct DwdWeatherClient {
    station_url: String,
    client: reqwest::Client,
    available_from: DateTime<Utc>,
    available_until: DateTime<Utc>,
    cache: Arc<RwLock<Option<(DateTime<Utc>, Vec<String>)>>>,
    ttl: Duration,
}

impl DwdWeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("water-demand-forecaster/", env!("CARGO_PKG_VERSION"))),
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| PipelineError::SourceUnavailable(format!("weather client: {e}")))?;

        Ok(Self {
            station_url: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.station.trim_matches('/')
            ),
            client,
            available_from: config.available_from,
            available_until: config.available_until,
            cache: Arc::new(RwLock::new(None)),
            ttl: Duration::from_secs(config.capabilities_ttl_seconds),
        })
    }

    fn series_url(&self, capability: &str, start_unix: i64, end_unix: i64) -> String {
        format!(
            "{}/{}/hourly?from={start_unix}&until={end_unix}",
            self.station_url, capability
        )
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let unavailable = |what: &str, e: &dyn std::fmt::Display| {
            PipelineError::SourceUnavailable(format!("weather {what} failed for {url}: {e}"))
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable("GET", &e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| unavailable("read", &e))?;
        if !status.is_success() {
            warn!(%status, url, "weather API error");
            return Err(PipelineError::SourceUnavailable(format!(
                "weather API error: HTTP {status}: {body}"
            )));
        }
        serde_json::from_str(&body).map_err(|e| unavailable("JSON parse", &e))
    }

    /// Hourly capability covering the whole availability window
    fn is_usable(&self, entry: &RawCapability) -> bool {
        if entry.resolution != "hourly" {
            debug!(capability = %entry.data_type, resolution = %entry.resolution, "capability skipped");
            return false;
        }
        if entry.available_from > self.available_from || entry.available_until < self.available_until {
            debug!(
                capability = %entry.data_type,
                from = %entry.available_from,
                until = %entry.available_until,
                "capability outside availability window"
            );
            return false;
        }
        true
    }
}

#[async_trait]
impl WeatherSource for DwdWeatherClient {
    async fn fetch(
        &self,
        capability: &str,
        column: &str,
        start_unix: i64,
        end_unix: i64,
    ) -> Result<Series> {
        let url = self.series_url(capability, start_unix, end_unix);
        debug!(url, "fetching weather series");

        let raw: RawTimeseries = self.get_json(&url).await?;
        let observations: Vec<Observation> = raw
            .timeseries
            .iter()
            .filter_map(|record| {
                let ts = record.get("ts")?.as_str()?;
                let timestamp = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
                let value = record.get(column)?.as_f64()?;
                Some(Observation::new(timestamp, value))
            })
            .collect();

        info!(
            capability,
            column,
            records = raw.timeseries.len(),
            observations = observations.len(),
            "weather series fetched"
        );
        Ok(Series::from_observations(column, observations))
    }

    async fn capabilities(&self) -> Result<Vec<String>> {
        {
            let c = self.cache.read().await;
            if let Some((ts, v)) = &*c {
                if (Utc::now() - *ts).num_seconds() < self.ttl.as_secs() as i64 {
                    return Ok(v.clone());
                }
            }
        }

        let raw: RawCapabilities = self.get_json(&self.station_url).await?;
        let capabilities: Vec<String> = raw
            .capabilities
            .into_iter()
            .filter(|entry| self.is_usable(entry))
            .map(|entry| entry.data_type)
            .collect();

        let mut c = self.cache.write().await;
        *c = Some((Utc::now(), capabilities.clone()));
        Ok(capabilities)
    }

    async fn columns(&self, capability: &str) -> Result<Vec<String>> {
        let start = self.available_from.timestamp();
        let url = self.series_url(capability, start, start + COLUMN_PROBE_SECONDS);

        let raw: RawTimeseries = self.get_json(&url).await?;
        Ok(raw
            .timeseries
            .first()
            .map(|record| record.keys().filter(|k| *k != "ts").cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct RawCapabilities {
    #[serde(default)]
    capabilities: Vec<RawCapability>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCapability {
    data_type: String,
    resolution: String,
    available_from: DateTime<Utc>,
    available_until: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawTimeseries {
    #[serde(default)]
    timeseries: Vec<Map<String, Value>>,
}
