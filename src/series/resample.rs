//! Fixed-cadence resampling
//!
//! Raw observations are grouped into buckets of the requested resolution and
//! averaged. Bucket boundaries are computed on whole seconds since the epoch:
//! hourly and daily buckets are epoch aligned (UTC hours and UTC midnights), weekly
//! buckets are 7-day windows anchored at the UTC midnight of the origin.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::{Observation, Resolution, Series};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    resolution: Resolution,
    origin: Option<DateTime<Utc>>,
}

impl Resampler {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            origin: None,
        }
    }

    /// Anchor weekly windows at the day of `origin` instead of the first observation
    pub fn anchored_at(mut self, origin: DateTime<Utc>) -> Self {
        self.origin = Some(origin);
        self
    }

    fn anchor_seconds(&self, first: DateTime<Utc>) -> i64 {
        match self.resolution {
            Resolution::Hourly | Resolution::Daily => 0,
            Resolution::Weekly => {
                let origin = self.origin.unwrap_or(first).timestamp();
                origin.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
            }
        }
    }

    fn bucket_seconds(&self, timestamp: DateTime<Utc>, anchor: i64) -> i64 {
        let step = self.resolution.step().num_seconds();
        anchor + (timestamp.timestamp() - anchor).div_euclid(step) * step
    }

    /// Mean of every finite observation per bucket. Buckets without observations
    /// are left out; gap filling is the aligner's job.
    pub fn resample(&self, series: &Series) -> Series {
        let Some(first) = series.first() else {
            return Series::empty(series.name());
        };
        let anchor = self.anchor_seconds(first.timestamp);

        let mut buckets: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
        for obs in series.observations().iter().filter(|o| o.value.is_finite()) {
            let entry = buckets
                .entry(self.bucket_seconds(obs.timestamp, anchor))
                .or_insert((0.0, 0));
            entry.0 += obs.value;
            entry.1 += 1;
        }

        let observations: Vec<Observation> = buckets
            .into_iter()
            .filter_map(|(secs, (sum, count))| {
                DateTime::from_timestamp(secs, 0)
                    .map(|ts| Observation::new(ts, sum / count as f64))
            })
            .collect();

        debug!(
            series = series.name(),
            resolution = %self.resolution,
            raw_points = series.len(),
            buckets = observations.len(),
            "resampled series"
        );

        Series::from_observations(series.name(), observations)
    }
}
