//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use figment::{providers::{Format, Toml}, Figment};
use std::path::Path;

use water_demand_forecaster::config::{Config, WeatherConfig};
use water_demand_forecaster::domain::Observation;
use water_demand_forecaster::repo::InMemorySeriesStore;

pub const STATION: &str = "01766";

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 5, 26, 0, 0, 0).unwrap()
}

/// Daily demand cycle with a small repeating ripple
pub fn demand(hour: i64) -> f64 {
    let cycle = ((hour % 24) as f64 / 24.0 * std::f64::consts::TAU).sin();
    40.0 + 10.0 * cycle + (hour % 5) as f64
}

pub fn hourly_store(meters: &[&str], days: i64) -> InMemorySeriesStore {
    let store = InMemorySeriesStore::new();
    for meter in meters {
        store.insert(
            *meter,
            (0..days * 24).map(|h| Observation::new(start() + Duration::hours(h), demand(h))),
        );
    }
    store
}

pub fn weather_config(base_url: &str) -> WeatherConfig {
    WeatherConfig {
        base_url: base_url.to_string(),
        station: STATION.to_string(),
        http_timeout_seconds: 5,
        capabilities_ttl_seconds: 3600,
        sentinel: -999.0,
        available_from: start(),
        available_until: Utc.with_ymd_and_hms(2023, 5, 26, 0, 0, 0).unwrap(),
    }
}

pub fn app_config(models_dir: &Path, base_url: &str) -> Config {
    let toml = format!(
        r#"
        [server]
        host = "127.0.0.1"
        port = 0

        [store]
        backend = "memory"

        [weather]
        base_url = "{base_url}"
        station = "{STATION}"
        http_timeout_seconds = 5
        available_from = "2021-05-26T00:00:00Z"
        available_until = "2023-05-26T00:00:00Z"

        [models]
        dir = "{}"
        "#,
        models_dir.display()
    );
    Config::from_figment(Figment::new().merge(Toml::string(&toml))).unwrap()
}
