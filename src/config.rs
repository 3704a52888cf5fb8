use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::ml::TrainerConfig;
use crate::repo::CacheConfig;

pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "WDF__";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub weather: WeatherConfig,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub enable_cors: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}
impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

fn default_request_timeout() -> u64 { 600 }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend { Memory, Postgres }

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// JSON array of `{name, date, value}` records for the memory backend
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

fn default_max_connections() -> u32 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    pub base_url: String,
    pub station: String,
    pub http_timeout_seconds: u64,
    #[serde(default = "default_capabilities_ttl")]
    pub capabilities_ttl_seconds: u64,
    /// Marker the weather API uses for missing readings
    #[serde(default = "default_sentinel")]
    pub sentinel: f64,
    /// Capabilities must cover this whole window to be offered
    pub available_from: DateTime<Utc>,
    pub available_until: DateTime<Utc>,
}

fn default_capabilities_ttl() -> u64 { 3600 }
fn default_sentinel() -> f64 { -999.0 }

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub allow_duplicates: bool,
    #[serde(default = "default_horizon")]
    pub forecast_horizon: usize,
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    #[serde(default)]
    pub search: TrainerConfig,
}

fn default_horizon() -> usize { 24 }
fn default_confidence() -> f64 { 0.9 }

impl ModelsConfig {
    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            dir: self.dir.clone(),
            allow_duplicates: self.allow_duplicates,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(DEFAULT_CONFIG_FILE))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment.extract().context("invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        host = "127.0.0.1"
        port = 8080

        [store]
        backend = "memory"

        [weather]
        base_url = "http://localhost:9000/api/v1/"
        station = "01766"
        http_timeout_seconds = 10
        available_from = "2021-05-26T00:00:00Z"
        available_until = "2023-05-26T00:00:00Z"

        [models]
        dir = "models"

        [models.search]
        seasonal_period = 12
    "#;

    #[test]
    fn test_defaults_fill_optional_fields() {
        let cfg = Config::from_figment(Figment::new().merge(Toml::string(SAMPLE))).unwrap();

        assert_eq!(cfg.server.socket_addr().unwrap().port(), 8080);
        assert!(!cfg.server.enable_cors);
        assert!(!cfg.logging.json);
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert_eq!(cfg.weather.sentinel, -999.0);
        assert_eq!(cfg.models.forecast_horizon, 24);
        assert_eq!(cfg.models.confidence_level, 0.9);
        assert_eq!(cfg.models.search.seasonal_period, 12);
        assert_eq!(cfg.models.search.max_p, 5);
        assert!(!cfg.models.cache().allow_duplicates);
    }

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("WDF__MODELS__ALLOW_DUPLICATES", "true");
            jail.set_env("WDF__SERVER__PORT", "9090");
            let cfg = Config::from_figment(
                Figment::new()
                    .merge(Toml::string(SAMPLE))
                    .merge(Env::prefixed(ENV_PREFIX).split("__")),
            )
            .unwrap();

            assert!(cfg.models.allow_duplicates);
            assert_eq!(cfg.server.port, 9090);
            Ok(())
        });
    }
}
