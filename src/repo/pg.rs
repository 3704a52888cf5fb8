#![cfg(feature = "db")]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;

use super::SeriesStore;
use crate::domain::{Observation, Series};
use crate::error::{PipelineError, Result};

/// Meter readings in `timeseries.water_demand_prediction(name, date, value)`
pub struct PgSeriesStore {
    pub pool: PgPool,
}

impl PgSeriesStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(unavailable)?;
        Ok(Self { pool })
    }
}

fn unavailable(err: sqlx::Error) -> PipelineError {
    PipelineError::SourceUnavailable(format!("database: {err}"))
}

#[async_trait]
impl SeriesStore for PgSeriesStore {
    async fn fetch(&self, meter: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Series> {
        let rows: Vec<(DateTime<Utc>, f64)> = sqlx::query_as(
            r#"
            SELECT date, value
            FROM timeseries.water_demand_prediction
            WHERE name = $1 AND date BETWEEN $2 AND $3
            ORDER BY date ASC
            "#,
        )
        .bind(meter)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        debug!(meter, points = rows.len(), "fetched meter readings");
        Ok(Series::from_observations(
            meter,
            rows.into_iter()
                .map(|(date, value)| Observation::new(date, value))
                .collect(),
        ))
    }

    async fn meter_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT DISTINCT name FROM timeseries.water_demand_prediction ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)
    }
}
