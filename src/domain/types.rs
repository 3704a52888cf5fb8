use chrono::{DateTime, Duration, Months, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::{PipelineError, Result};

// ============================================================================
// Observations & Series
// ============================================================================

/// A single raw measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered observations for one meter or weather column.
///
/// Timestamps are strictly increasing; gaps are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    name: String,
    observations: Vec<Observation>,
}

impl Series {
    /// Build a series from observations in any order.
    ///
    /// Observations are sorted by timestamp; when a timestamp repeats, the first
    /// occurrence wins.
    pub fn from_observations(name: impl Into<String>, mut observations: Vec<Observation>) -> Self {
        observations.sort_by_key(|o| o.timestamp);
        observations.dedup_by_key(|o| o.timestamp);
        Self {
            name: name.into(),
            observations,
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            observations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.observations.iter().map(|o| o.timestamp).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    /// Smallest positive spacing between consecutive timestamps
    pub fn cadence(&self) -> Option<Duration> {
        use itertools::Itertools;

        self.observations
            .iter()
            .tuple_windows()
            .map(|(a, b)| b.timestamp - a.timestamp)
            .filter(|d| *d > Duration::zero())
            .min()
    }

    /// Fail with `NoData` when the series has no observations
    pub fn require_data(&self) -> Result<&Self> {
        if self.is_empty() {
            return Err(PipelineError::NoData(format!(
                "series '{}' contains no observations",
                self.name
            )));
        }
        Ok(self)
    }
}

// ============================================================================
// Resolution & Timeframe
// ============================================================================

/// Target sampling cadence of a resampled series
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Resolution {
    Hourly,
    Daily,
    /// Fixed 7-day windows, not calendar weeks
    Weekly,
}

impl Resolution {
    /// Bucket width
    pub fn step(&self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::days(7),
        }
    }
}

/// Length of the training window requested by a caller
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    Display, EnumString, AsRefStr, EnumIter,
)]
pub enum Timeframe {
    #[serde(rename = "one day")]
    #[strum(serialize = "one day")]
    OneDay,
    #[serde(rename = "one week")]
    #[strum(serialize = "one week")]
    OneWeek,
    #[serde(rename = "one month")]
    #[strum(serialize = "one month")]
    OneMonth,
    #[serde(rename = "three months")]
    #[strum(serialize = "three months")]
    ThreeMonths,
    #[serde(rename = "six months")]
    #[strum(serialize = "six months")]
    SixMonths,
    #[serde(rename = "one year")]
    #[strum(serialize = "one year")]
    OneYear,
    #[serde(rename = "all")]
    #[strum(serialize = "all")]
    All,
}

impl Timeframe {
    /// Inclusive end of the window starting at `start`.
    ///
    /// One hour is taken off the span so an hourly window holds exactly
    /// `span / 1h` readings including the start.
    pub fn end_date(&self, start: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let end = match self {
            Self::OneDay => Some(start + Duration::days(1)),
            Self::OneWeek => Some(start + Duration::weeks(1)),
            Self::OneMonth => start.checked_add_months(Months::new(1)),
            Self::ThreeMonths => start.checked_add_months(Months::new(3)),
            Self::SixMonths => start.checked_add_months(Months::new(6)),
            Self::OneYear => start.checked_add_months(Months::new(12)),
            Self::All => start.checked_add_months(Months::new(24)),
        }
        .ok_or_else(|| {
            PipelineError::InvalidRequest(format!("timeframe '{self}' overflows from {start}"))
        })?;

        Ok(end - Duration::hours(1))
    }
}

pub fn parse_resolution(raw: &str) -> Result<Resolution> {
    raw.trim()
        .parse()
        .map_err(|_| PipelineError::InvalidRequest(format!("unsupported resolution '{raw}'")))
}

pub fn parse_timeframe(raw: &str) -> Result<Timeframe> {
    raw.trim()
        .parse()
        .map_err(|_| PipelineError::InvalidRequest(format!("unsupported timeframe '{raw}'")))
}

/// Parse a start instant. Accepts RFC 3339 and naive `YYYY-MM-DD HH:MM:SS` /
/// `YYYY-MM-DDTHH:MM:SS`, the latter read as UTC.
pub fn parse_start(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| PipelineError::InvalidRequest(format!("unparseable start '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 5, 26, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    #[test]
    fn test_series_sorts_and_dedups() {
        let series = Series::from_observations(
            "m",
            vec![
                Observation::new(at(2), 3.0),
                Observation::new(at(0), 1.0),
                Observation::new(at(2), 9.0),
                Observation::new(at(1), 2.0),
            ],
        );

        assert_eq!(series.values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(series.cadence(), Some(Duration::hours(1)));
    }

    #[test]
    fn test_empty_series_requires_data() {
        let err = Series::empty("ghost").require_data().unwrap_err();
        assert_eq!(err.kind(), "NoDataError");
    }

    #[rstest]
    #[case(Timeframe::OneDay, 23)]
    #[case(Timeframe::OneWeek, 167)]
    #[case(Timeframe::OneMonth, 31 * 24 - 1)]
    fn test_end_date(#[case] timeframe: Timeframe, #[case] hours: i64) {
        assert_eq!(timeframe.end_date(at(0)).unwrap(), at(hours));
    }

    #[rstest]
    #[case("one week", Timeframe::OneWeek)]
    #[case("three months", Timeframe::ThreeMonths)]
    #[case(" all ", Timeframe::All)]
    fn test_parse_timeframe(#[case] raw: &str, #[case] expected: Timeframe) {
        assert_eq!(parse_timeframe(raw).unwrap(), expected);
    }

    #[test]
    fn test_labels_round_trip_through_strum_and_serde() {
        assert_eq!(Timeframe::OneWeek.to_string(), "one week");
        assert_eq!(Resolution::Daily.as_ref(), "daily");
        assert_eq!(parse_resolution("weekly").unwrap(), Resolution::Weekly);
        assert_eq!(
            serde_json::to_string(&Timeframe::SixMonths).unwrap(),
            "\"six months\""
        );
        assert!(parse_resolution("monthly").is_err());
    }

    #[rstest]
    #[case("2021-05-26 00:00:00")]
    #[case("2021-05-26T00:00:00")]
    #[case("2021-05-26T00:00:00Z")]
    #[case("2021-05-26T02:00:00+02:00")]
    fn test_parse_start(#[case] raw: &str) {
        assert_eq!(parse_start(raw).unwrap(), at(0));
    }
}
