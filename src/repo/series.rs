//! Raw meter readings

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::domain::{Observation, Series};
use crate::error::{PipelineError, Result};

/// Source of per-meter consumption readings
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Readings of `meter` with `start <= timestamp <= end`. Unknown meters yield
    /// an empty series.
    async fn fetch(&self, meter: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Series>;

    async fn meter_names(&self) -> Result<Vec<String>>;
}

/// One row of a seed file
#[derive(Debug, Clone, Deserialize)]
pub struct SeedRecord {
    pub name: String,
    pub date: DateTime<Utc>,
    pub value: f64,
}

/// Series store held in memory
#[derive(Debug, Default)]
pub struct InMemorySeriesStore {
    meters: RwLock<HashMap<String, Vec<Observation>>>,
}

impl InMemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of `{name, date, value}` records
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::SourceUnavailable(format!("cannot read seed file {}: {e}", path.display()))
        })?;
        let records: Vec<SeedRecord> = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::SourceUnavailable(format!("invalid seed file {}: {e}", path.display()))
        })?;

        let store = Self::from_records(records);
        info!(
            path = %path.display(),
            meters = store.meters.read().len(),
            "series store seeded"
        );
        Ok(store)
    }

    pub fn from_records(records: impl IntoIterator<Item = SeedRecord>) -> Self {
        let store = Self::new();
        {
            let mut meters = store.meters.write();
            for record in records {
                meters
                    .entry(record.name)
                    .or_default()
                    .push(Observation::new(record.date, record.value));
            }
        }
        store
    }

    pub fn insert(&self, meter: impl Into<String>, observations: impl IntoIterator<Item = Observation>) {
        self.meters
            .write()
            .entry(meter.into())
            .or_default()
            .extend(observations);
    }
}

#[async_trait]
impl SeriesStore for InMemorySeriesStore {
    async fn fetch(&self, meter: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Series> {
        let observations: Vec<Observation> = self
            .meters
            .read()
            .get(meter)
            .map(|obs| {
                obs.iter()
                    .filter(|o| o.timestamp >= start && o.timestamp <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        debug!(meter, %start, %end, points = observations.len(), "fetched meter readings");
        Ok(Series::from_observations(meter, observations))
    }

    async fn meter_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.meters.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
