pub mod pipeline;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::forecast::{DwdWeatherClient, ForecastEngine, WeatherSource};
use crate::ml::ModelTrainer;
use crate::repo::{self, ModelCache};
use crate::series::Aligner;

pub use pipeline::{ForecastService, TrainOutcome};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub service: Arc<ForecastService>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let series = repo::series_store(&cfg.store)
            .await
            .context("failed to open series store")?;
        let weather: Arc<dyn WeatherSource> = Arc::new(
            DwdWeatherClient::new(&cfg.weather).context("failed to build weather client")?,
        );
        let cache = Arc::new(
            ModelCache::new(cfg.models.cache()).context("failed to open model cache")?,
        );
        let engine = ForecastEngine::new(cfg.models.forecast_horizon, cfg.models.confidence_level)
            .context("invalid forecast settings")?;

        let service = ForecastService::new(
            series,
            weather,
            cache,
            ModelTrainer::new(cfg.models.search.clone()),
            engine,
            Aligner::new(cfg.weather.sentinel),
        );
        info!(
            backend = ?cfg.store.backend,
            models_dir = %cfg.models.dir.display(),
            horizon = cfg.models.forecast_horizon,
            "forecast service ready"
        );

        Ok(Self {
            cfg: Arc::new(cfg),
            service: Arc::new(service),
        })
    }

    pub fn from_service(cfg: Config, service: ForecastService) -> Self {
        Self {
            cfg: Arc::new(cfg),
            service: Arc::new(service),
        }
    }
}
