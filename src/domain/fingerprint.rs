//! Deterministic keys for trainable forecasting configurations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Resolution, Timeframe};
use crate::error::{PipelineError, Result};

/// Longest stem that still leaves room for the extension and the temporary
/// `.{stem}.{uuid}.tmp` name within a 255 byte filename
pub const MAX_STEM_BYTES: usize = 200;

/// Capability label that means "no exogenous covariate"
pub const PLAIN_CAPABILITY: &str = "plain";
/// Column placeholder stored for plain configurations
pub const NO_COLUMN: &str = "no_column";

/// Weather covariate attached to a configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherSelection {
    Plain,
    Exogenous { capability: String, column: String },
}

impl WeatherSelection {
    /// Normalize a raw capability/column pair. A `plain` capability discards the
    /// column entirely.
    pub fn from_parts(capability: &str, column: &str) -> Self {
        if capability.trim() == PLAIN_CAPABILITY {
            Self::Plain
        } else {
            Self::Exogenous {
                capability: capability.to_string(),
                column: column.to_string(),
            }
        }
    }

    pub fn capability(&self) -> &str {
        match self {
            Self::Plain => PLAIN_CAPABILITY,
            Self::Exogenous { capability, .. } => capability,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Plain => NO_COLUMN,
            Self::Exogenous { column, .. } => column,
        }
    }

    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Plain)
    }
}

/// Identity of one trainable configuration. Two requests with equal fingerprints
/// resolve to the same cached bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub meter: String,
    pub timeframe: Timeframe,
    pub resolution: Resolution,
    pub start: DateTime<Utc>,
    pub weather: WeatherSelection,
}

impl Fingerprint {
    pub fn new(
        meter: impl Into<String>,
        timeframe: Timeframe,
        resolution: Resolution,
        start: DateTime<Utc>,
        capability: &str,
        column: &str,
    ) -> Self {
        Self {
            meter: meter.into(),
            timeframe,
            resolution,
            start,
            weather: WeatherSelection::from_parts(capability, column),
        }
    }

    /// Filename stem of the persisted bundle.
    ///
    /// `{resolution}-{timeframe}-{meter}-{start}-{capability}-{column}` where the
    /// start is rendered as `%Y-%m-%dT%H_%M_%S` and free-text fields are escaped
    /// so that none of them contains a raw `-`. Splitting on `-` therefore always
    /// yields the same eight segments, which keeps the mapping injective.
    pub fn file_stem(&self) -> String {
        let mut start = self.start.format("%Y-%m-%dT%H_%M_%S").to_string();
        let nanos = self.start.timestamp_subsec_nanos();
        if nanos != 0 {
            start.push_str(&format!(".{nanos:09}"));
        }

        format!(
            "{}-{}-{}-{}-{}-{}",
            self.resolution,
            self.timeframe,
            escape_segment(&self.meter),
            start,
            escape_segment(self.weather.capability()),
            escape_segment(self.weather.column()),
        )
    }
}

impl Fingerprint {
    /// Reject fingerprints whose escaped stem cannot be used as a filename
    pub fn ensure_storable(&self) -> Result<()> {
        let len = self.file_stem().len();
        if len > MAX_STEM_BYTES {
            return Err(PipelineError::InvalidRequest(format!(
                "model name too long: escaped filename stem is {len} bytes, at most {MAX_STEM_BYTES} allowed"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_stem())
    }
}

/// Percent-escape delimiter and path-unsafe characters. Spaces are kept.
fn escape_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' | '-' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => {
                out.push_str(&format!("%{:02X}", c as u32));
            }
            c if c.is_control() => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 5, 26, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_escaped_stem_length_is_bounded() {
        let short = Fingerprint::new(
            "a".repeat(120),
            Timeframe::OneDay,
            Resolution::Hourly,
            start(),
            "plain",
            "",
        );
        assert!(short.ensure_storable().is_ok());

        let dashes = Fingerprint::new(
            "-".repeat(100),
            Timeframe::OneDay,
            Resolution::Hourly,
            start(),
            "plain",
            "",
        );
        assert!(dashes.file_stem().len() > MAX_STEM_BYTES);
        assert!(matches!(dashes.ensure_storable(), Err(PipelineError::InvalidRequest(_))));
    }

    #[test]
    fn test_plain_stem_layout() {
        let fp = Fingerprint::new(
            "single",
            Timeframe::OneWeek,
            Resolution::Daily,
            start(),
            "plain",
            "TT_TU",
        );

        assert_eq!(fp.weather, WeatherSelection::Plain);
        assert_eq!(
            fp.file_stem(),
            "daily-one week-single-2021-05-26T00_00_00-plain-no_column"
        );
    }

    #[test]
    fn test_exogenous_stem_keeps_underscores() {
        let fp = Fingerprint::new(
            "family",
            Timeframe::OneMonth,
            Resolution::Hourly,
            start(),
            "air_temperature",
            "TT_TU",
        );

        assert_eq!(
            fp.file_stem(),
            "hourly-one month-family-2021-05-26T00_00_00-air_temperature-TT_TU"
        );
    }

    #[test]
    fn test_delimiters_in_meter_names_cannot_shift_fields() {
        let a = Fingerprint::new("a-b", Timeframe::OneDay, Resolution::Hourly, start(), "x", "y");
        let b = Fingerprint::new("a", Timeframe::OneDay, Resolution::Hourly, start(), "b-x", "y");

        assert_ne!(a.file_stem(), b.file_stem());
        assert!(a.file_stem().contains("a%2Db"));
    }

    #[test]
    fn test_path_separators_are_escaped() {
        let fp = Fingerprint::new(
            "../etc/passwd",
            Timeframe::OneDay,
            Resolution::Hourly,
            start(),
            "plain",
            "",
        );

        assert!(!fp.file_stem().contains('/'));
        assert!(fp.file_stem().contains("..%2Fetc%2Fpasswd"));
    }

    #[test]
    fn test_plain_never_collides_with_literal_no_column() {
        let plain = Fingerprint::new("m", Timeframe::OneDay, Resolution::Hourly, start(), "plain", "");
        let exog = Fingerprint::new(
            "m",
            Timeframe::OneDay,
            Resolution::Hourly,
            start(),
            "precipitation",
            "no_column",
        );

        assert_ne!(plain.file_stem(), exog.file_stem());
    }
}
