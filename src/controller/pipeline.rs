//! Forecasting pipeline
//!
//! Wires the series store, weather source, trainer, cache and forecast engine
//! into the operations exposed over HTTP.

use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{
    Fingerprint, ForecastResult, ModelBundle, Resolution, Series, Timeframe, WeatherSelection,
};
use crate::error::{PipelineError, Result};
use crate::forecast::{evaluate, ForecastEngine, WeatherSource};
use crate::ml::{ModelTrainer, SarimaOrder};
use crate::repo::{ModelCache, SeriesStore};
use crate::series::{AlignedSeries, Aligner, Resampler, TailFill};

/// Summary of a successful training run
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub fingerprint: Fingerprint,
    pub path: PathBuf,
    pub order: SarimaOrder,
    pub aic: f64,
    pub training_duration: f64,
    pub training_points: usize,
    pub forecast_labels: Vec<DateTime<Utc>>,
    pub held_out_points: usize,
}

pub struct ForecastService {
    series: Arc<dyn SeriesStore>,
    weather: Arc<dyn WeatherSource>,
    cache: Arc<ModelCache>,
    trainer: ModelTrainer,
    engine: ForecastEngine,
    aligner: Aligner,
}

impl ForecastService {
    pub fn new(
        series: Arc<dyn SeriesStore>,
        weather: Arc<dyn WeatherSource>,
        cache: Arc<ModelCache>,
        trainer: ModelTrainer,
        engine: ForecastEngine,
        aligner: Aligner,
    ) -> Self {
        Self {
            series,
            weather,
            cache,
            trainer,
            engine,
            aligner,
        }
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Train a model for `fingerprint` and persist it with its forecast labels and
    /// held-out real values
    pub async fn train(&self, fingerprint: &Fingerprint) -> Result<TrainOutcome> {
        info!(fingerprint = %fingerprint, "training requested");
        fingerprint.ensure_storable()?;
        if !self.cache.allows_duplicates() && self.cache.contains(fingerprint) {
            return Err(PipelineError::DuplicateModel(fingerprint.to_string()));
        }

        let start = fingerprint.start;
        let end = fingerprint.timeframe.end_date(start)?;
        let resolution = fingerprint.resolution;
        let resampler = Resampler::new(resolution).anchored_at(start);

        let raw = self.series.fetch(&fingerprint.meter, start, end).await?;
        if raw.is_empty() {
            return Err(PipelineError::NoData(format!(
                "no readings for meter '{}' between {start} and {end}",
                fingerprint.meter
            )));
        }
        let target = resampler.resample(&raw);

        let aligned = match &fingerprint.weather {
            WeatherSelection::Plain => self.aligner.fill_gaps(&target, resolution.step())?,
            WeatherSelection::Exogenous { capability, column } => {
                let raw_weather = self
                    .weather
                    .fetch(capability, column, start.timestamp(), end.timestamp())
                    .await?;
                let weather = resampler.resample(&self.aligner.mask_sentinel(&raw_weather));
                self.aligner.align(&target, &weather, resolution.step())?
            }
        };

        let trained = self.fit(&aligned).await.map_err(|e| {
            error!(fingerprint = %fingerprint, error = %e, "training failed");
            e
        })?;

        let labels = self.engine.labels(aligned.last_timestamp(), resolution);
        let held_out = self.held_out_values(fingerprint, &labels).await?;

        let bundle = ModelBundle {
            training_duration: trained.duration.as_secs_f64(),
            model: trained.model,
            start_date: start,
            end_date: end,
            forecast_labels: labels.clone(),
            held_out_real_values: held_out,
        };
        let outcome = TrainOutcome {
            fingerprint: fingerprint.clone(),
            path: PathBuf::new(),
            order: bundle.model.order(),
            aic: bundle.model.aic(),
            training_duration: bundle.training_duration,
            training_points: aligned.len(),
            forecast_labels: labels,
            held_out_points: bundle.held_out_real_values.len(),
        };

        let path = self.save_bundle(fingerprint, bundle).await?;
        info!(
            fingerprint = %fingerprint,
            order = %outcome.order,
            points = outcome.training_points,
            held_out = outcome.held_out_points,
            "model stored"
        );
        Ok(TrainOutcome { path, ..outcome })
    }

    async fn fit(&self, aligned: &AlignedSeries) -> Result<crate::ml::TrainedModel> {
        let trainer = self.trainer.clone();
        let target = aligned.target().to_vec();
        let exogenous = aligned.exogenous().map(<[f64]>::to_vec);

        tokio::task::spawn_blocking(move || trainer.train(&target, exogenous.as_deref()))
            .await
            .map_err(|e| PipelineError::TrainingFailed(format!("training task aborted: {e}")))?
    }

    /// Real readings for the forecast labels; trailing labels without data are
    /// dropped
    async fn held_out_values(
        &self,
        fingerprint: &Fingerprint,
        labels: &[DateTime<Utc>],
    ) -> Result<Vec<f64>> {
        let (Some(first), Some(last)) = (labels.first(), labels.last()) else {
            return Ok(Vec::new());
        };
        let until = *last + fingerprint.resolution.step() - Duration::seconds(1);

        let raw = self.series.fetch(&fingerprint.meter, *first, until).await?;
        let resampled = Resampler::new(fingerprint.resolution)
            .anchored_at(fingerprint.start)
            .resample(&raw);
        self.aligner
            .align_to_index(&resampled, labels, TailFill::Truncate)
    }

    async fn save_bundle(&self, fingerprint: &Fingerprint, bundle: ModelBundle) -> Result<PathBuf> {
        let cache = self.cache.clone();
        let fingerprint = fingerprint.clone();
        tokio::task::spawn_blocking(move || cache.save(&fingerprint, &bundle))
            .await
            .map_err(|e| PipelineError::Storage(format!("save task aborted: {e}")))?
    }

    async fn load_bundle(&self, fingerprint: &Fingerprint) -> Result<ModelBundle> {
        let cache = self.cache.clone();
        let fingerprint = fingerprint.clone();
        tokio::task::spawn_blocking(move || cache.load(&fingerprint))
            .await
            .map_err(|e| PipelineError::Storage(format!("load task aborted: {e}")))?
    }

    /// Forecast from the stored bundle and evaluate against its held-out values
    pub async fn forecast(&self, fingerprint: &Fingerprint) -> Result<ForecastResult> {
        fingerprint.ensure_storable()?;
        let bundle = self.load_bundle(fingerprint).await?;
        let labels = bundle.forecast_labels.clone();

        let exogenous = match &fingerprint.weather {
            WeatherSelection::Plain => None,
            WeatherSelection::Exogenous { capability, column } => Some(
                self.future_weather(fingerprint, capability, column, &labels)
                    .await?,
            ),
        };

        let prediction = self.engine.forecast(&bundle, exogenous.as_deref())?;

        let compared = bundle.held_out_real_values.len().min(prediction.point.len());
        let real_values = bundle.held_out_real_values[..compared].to_vec();
        let metrics = if compared >= 2 {
            Some(evaluate(&real_values, &prediction.point[..compared])?)
        } else {
            warn!(
                fingerprint = %fingerprint,
                held_out = compared,
                "not enough held-out values to evaluate the forecast"
            );
            None
        };

        info!(
            fingerprint = %fingerprint,
            points = prediction.point.len(),
            evaluated = compared,
            "forecast served"
        );

        Ok(ForecastResult {
            labels,
            point_values: prediction.point,
            lower_bound: prediction.lower,
            upper_bound: prediction.upper,
            real_values,
            metrics,
            aic: bundle.model.aic(),
            order: bundle.model.order(),
            training_duration: bundle.training_duration,
        })
    }

    async fn future_weather(
        &self,
        fingerprint: &Fingerprint,
        capability: &str,
        column: &str,
        labels: &[DateTime<Utc>],
    ) -> Result<Vec<f64>> {
        let (Some(first), Some(last)) = (labels.first(), labels.last()) else {
            return Ok(Vec::new());
        };
        let until = *last + fingerprint.resolution.step() - Duration::seconds(1);

        let raw = self
            .weather
            .fetch(capability, column, first.timestamp(), until.timestamp())
            .await?;
        let resampled = Resampler::new(fingerprint.resolution)
            .anchored_at(fingerprint.start)
            .resample(&self.aligner.mask_sentinel(&raw));

        let values = self
            .aligner
            .align_to_index(&resampled, labels, TailFill::Forward)
            .map_err(|e| match e {
                PipelineError::NoData(msg) => PipelineError::ForecastInput(msg),
                other => other,
            })?;
        if values.len() != labels.len() {
            return Err(PipelineError::ForecastInput(format!(
                "{} weather values for {} forecast labels",
                values.len(),
                labels.len()
            )));
        }
        Ok(self.aligner.clear_sentinel(values))
    }

    /// Resampled readings of one meter over a timeframe
    pub async fn meter_series(
        &self,
        meter: &str,
        timeframe: Timeframe,
        resolution: Resolution,
        start: DateTime<Utc>,
    ) -> Result<Series> {
        let end = timeframe.end_date(start)?;
        let raw = self.series.fetch(meter, start, end).await?;
        let series = Resampler::new(resolution).anchored_at(start).resample(&raw);
        series.require_data()?;
        Ok(series)
    }

    /// Meter names with a display label built from their first two dash-separated
    /// parts
    pub async fn meter_names(&self) -> Result<BTreeMap<String, String>> {
        let names = self.series.meter_names().await?;
        Ok(names
            .into_iter()
            .map(|name| {
                let label = display_label(&name);
                (name, label)
            })
            .collect())
    }

    /// Usable weather capabilities, optionally with their columns
    pub async fn weather_capabilities(
        &self,
        with_columns: bool,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        let capabilities = self.weather.capabilities().await?;
        if !with_columns {
            return Ok(capabilities.into_iter().map(|c| (c, Vec::new())).collect());
        }

        let columns = try_join_all(capabilities.iter().map(|c| self.weather.columns(c))).await?;
        Ok(capabilities.into_iter().zip(columns).collect())
    }

    /// Columns of one capability; `plain` has none
    pub async fn capability_columns(&self, capability: &str) -> Result<Vec<String>> {
        if WeatherSelection::from_parts(capability, "").is_plain() {
            return Ok(Vec::new());
        }
        self.weather.columns(capability).await
    }

    pub async fn delete_model(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let cache = self.cache.clone();
        let fingerprint = fingerprint.clone();
        tokio::task::spawn_blocking(move || cache.delete(&fingerprint))
            .await
            .map_err(|e| PipelineError::Storage(format!("delete task aborted: {e}")))?
    }
}

fn display_label(name: &str) -> String {
    let mut parts = name.split('-');
    match (parts.next(), parts.next()) {
        (Some(first), Some(second)) => format!("{first} {second}"),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::forecast::MockWeatherSource;
    use crate::repo::{CacheConfig, InMemorySeriesStore};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 5, 26, 0, 0, 0).unwrap()
    }

    fn hourly(meter: &str, hours: i64) -> InMemorySeriesStore {
        let store = InMemorySeriesStore::new();
        store.insert(
            meter,
            (0..hours).map(|h| {
                let cycle = ((h % 24) as f64 / 24.0 * std::f64::consts::TAU).sin();
                Observation::new(start() + Duration::hours(h), 40.0 + 10.0 * cycle + (h % 5) as f64)
            }),
        );
        store
    }

    fn temperatures(from: i64, until: i64) -> Series {
        let observations = (from..=until)
            .step_by(3600)
            .map(|ts| {
                let at = DateTime::from_timestamp(ts, 0).unwrap();
                Observation::new(at, 15.0 + ((ts / 3600) % 7) as f64)
            })
            .collect();
        Series::from_observations("TT_TU", observations)
    }

    fn service(
        store: InMemorySeriesStore,
        weather: MockWeatherSource,
        dir: &std::path::Path,
    ) -> ForecastService {
        let cache = ModelCache::new(CacheConfig {
            dir: dir.to_path_buf(),
            allow_duplicates: false,
        })
        .unwrap();
        ForecastService::new(
            Arc::new(store),
            Arc::new(weather),
            Arc::new(cache),
            ModelTrainer::default(),
            ForecastEngine::default(),
            Aligner::new(-999.0),
        )
    }

    #[tokio::test]
    async fn test_plain_training_never_queries_weather() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(hourly("house-1", 24 * 30), MockWeatherSource::new(), dir.path());
        let fp = Fingerprint::new("house-1", Timeframe::OneWeek, Resolution::Daily, start(), "plain", "");

        let outcome = svc.train(&fp).await.unwrap();
        assert_eq!(outcome.training_points, 7);
        assert_eq!(outcome.forecast_labels.len(), 24);
        assert_eq!(outcome.forecast_labels[0], start() + Duration::days(7));
        // readings end on day 29, so the last label has no real value
        assert_eq!(outcome.held_out_points, 23);

        let result = svc.forecast(&fp).await.unwrap();
        assert_eq!(result.len(), 24);
        assert!(result.metrics.is_some());
    }

    #[tokio::test]
    async fn test_weather_training_and_forecast() {
        let dir = tempfile::tempdir().unwrap();
        let mut weather = MockWeatherSource::new();
        weather
            .expect_fetch()
            .times(2)
            .returning(|capability, column, from, until| {
                assert_eq!(capability, "air_temperature");
                assert_eq!(column, "TT_TU");
                Ok(temperatures(from, until))
            });

        let svc = service(hourly("house-2", 24 * 10), weather, dir.path());
        let fp = Fingerprint::new(
            "house-2",
            Timeframe::OneWeek,
            Resolution::Hourly,
            start(),
            "air_temperature",
            "TT_TU",
        );

        let outcome = svc.train(&fp).await.unwrap();
        assert_eq!(outcome.training_points, 24 * 7);

        let result = svc.forecast(&fp).await.unwrap();
        assert_eq!(result.len(), 24);
        assert_eq!(result.real_values.len(), 24);
        assert!(result.metrics.is_some());
    }

    /// Hourly temperatures constant within each day; `marked` replaces hour 5 of
    /// every day with the sentinel
    fn daily_temperatures(from: i64, until: i64, marked: bool) -> Series {
        let observations = (from..=until)
            .step_by(3600)
            .map(|ts| {
                let at = DateTime::from_timestamp(ts, 0).unwrap();
                let value = if marked && (ts / 3600) % 24 == 5 {
                    -999.0
                } else {
                    12.0 + ((ts / 86_400) % 3) as f64
                };
                Observation::new(at, value)
            })
            .collect();
        Series::from_observations("TT_TU", observations)
    }

    #[tokio::test]
    async fn test_daily_weather_ignores_sentinel_readings() {
        let fp = Fingerprint::new(
            "house-3",
            Timeframe::OneWeek,
            Resolution::Daily,
            start(),
            "air_temperature",
            "TT_TU",
        );

        let mut results = Vec::new();
        for marked in [true, false] {
            let dir = tempfile::tempdir().unwrap();
            let mut weather = MockWeatherSource::new();
            weather
                .expect_fetch()
                .times(2)
                .returning(move |_, _, from, until| Ok(daily_temperatures(from, until, marked)));

            let svc = service(hourly("house-3", 24 * 40), weather, dir.path());
            let outcome = svc.train(&fp).await.unwrap();
            assert_eq!(outcome.training_points, 7);

            let result = svc.forecast(&fp).await.unwrap();
            assert_eq!(result.len(), 24);
            assert!(result.point_values.iter().all(|v| v.is_finite()));
            results.push(result);
        }

        // daily means of the marked feed match the clean feed exactly
        assert_eq!(results[0].aic, results[1].aic);
        assert_eq!(results[0].point_values, results[1].point_values);
        assert_eq!(results[0].upper_bound, results[1].upper_bound);
    }

    #[tokio::test]
    async fn test_unknown_meter_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(InMemorySeriesStore::new(), MockWeatherSource::new(), dir.path());
        let fp = Fingerprint::new("ghost", Timeframe::OneDay, Resolution::Hourly, start(), "plain", "");

        let err = svc.train(&fp).await.unwrap_err();
        assert_eq!(err.kind(), "NoDataError");
        assert!(!svc.cache().contains(&fp));
    }

    #[tokio::test]
    async fn test_duplicate_training_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(hourly("m-1", 24 * 3), MockWeatherSource::new(), dir.path());
        let fp = Fingerprint::new("m-1", Timeframe::OneDay, Resolution::Hourly, start(), "plain", "");

        svc.train(&fp).await.unwrap();
        let err = svc.train(&fp).await.unwrap_err();
        assert_eq!(err.kind(), "DuplicateModelError");

        assert!(svc.delete_model(&fp).await.unwrap());
        svc.train(&fp).await.unwrap();
    }

    #[tokio::test]
    async fn test_forecast_without_model() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(InMemorySeriesStore::new(), MockWeatherSource::new(), dir.path());
        let fp = Fingerprint::new("m", Timeframe::OneDay, Resolution::Hourly, start(), "plain", "");

        assert_eq!(svc.forecast(&fp).await.unwrap_err().kind(), "ModelNotFoundError");
    }

    #[tokio::test]
    async fn test_capability_listing() {
        let dir = tempfile::tempdir().unwrap();
        let mut weather = MockWeatherSource::new();
        weather
            .expect_capabilities()
            .returning(|| Ok(vec!["air_temperature".to_string(), "precipitation".to_string()]));
        weather
            .expect_columns()
            .returning(|c| Ok(vec![format!("{c}_col")]));

        let svc = service(InMemorySeriesStore::new(), weather, dir.path());
        let caps = svc.weather_capabilities(true).await.unwrap();
        assert_eq!(caps["precipitation"], vec!["precipitation_col"]);
        assert!(svc.capability_columns("plain").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_meter_names_labels() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemorySeriesStore::new();
        store.insert("household-12-a", [Observation::new(start(), 1.0)]);
        store.insert("school", [Observation::new(start(), 1.0)]);
        let svc = service(store, MockWeatherSource::new(), dir.path());

        let names = svc.meter_names().await.unwrap();
        assert_eq!(names["household-12-a"], "household 12");
        assert_eq!(names["school"], "school");
    }
}
