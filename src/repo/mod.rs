use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;

pub mod models;
pub mod series;

#[cfg(feature = "db")]
pub mod pg;

pub use models::{CacheConfig, ModelCache};
pub use series::{InMemorySeriesStore, SeedRecord, SeriesStore};

/// Build the configured series store
pub async fn series_store(cfg: &StoreConfig) -> Result<Arc<dyn SeriesStore>> {
    match cfg.backend {
        StoreBackend::Memory => match &cfg.seed_file {
            Some(path) => Ok(Arc::new(InMemorySeriesStore::from_json_file(path).await?)),
            None => Ok(Arc::new(InMemorySeriesStore::new())),
        },
        #[cfg(feature = "db")]
        StoreBackend::Postgres => Ok(Arc::new(
            pg::PgSeriesStore::connect(&cfg.url, cfg.max_connections).await?,
        )),
        #[cfg(not(feature = "db"))]
        StoreBackend::Postgres => Err(crate::error::PipelineError::SourceUnavailable(
            "postgres backend requires the `db` feature".into(),
        )),
    }
}
