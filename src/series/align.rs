//! Gap filling and multi-source alignment
//!
//! Device and weather series are sampled independently. Both are projected onto
//! one regular grid and holes are back-filled: the next known measurement is the
//! best proxy for a short preceding gap. Slots after a series' last known value
//! are forward-filled from it.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::domain::{Observation, Series};
use crate::error::{PipelineError, Result};

/// Device values and an optional exogenous column on one shared index
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries {
    index: Vec<DateTime<Utc>>,
    target: Vec<f64>,
    exogenous: Option<Vec<f64>>,
}

impl AlignedSeries {
    pub fn new(
        index: Vec<DateTime<Utc>>,
        target: Vec<f64>,
        exogenous: Option<Vec<f64>>,
    ) -> Result<Self> {
        if index.is_empty() || target.is_empty() {
            return Err(PipelineError::NoData("aligned series is empty".into()));
        }
        if let Some(exog) = &exogenous {
            if exog.len() != target.len() {
                return Err(PipelineError::SeriesLengthMismatch {
                    target: target.len(),
                    exogenous: exog.len(),
                });
            }
        }
        if index.len() != target.len() {
            return Err(PipelineError::SeriesLengthMismatch {
                target: target.len(),
                exogenous: index.len(),
            });
        }
        Ok(Self {
            index,
            target,
            exogenous,
        })
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    pub fn exogenous(&self) -> Option<&[f64]> {
        self.exogenous.as_deref()
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn first_timestamp(&self) -> DateTime<Utc> {
        self.index[0]
    }

    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.index[self.index.len() - 1]
    }
}

/// What to do with slots after the last known value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailFill {
    /// Repeat the last known value
    Forward,
    /// Drop trailing slots; the output may be shorter than the index
    Truncate,
}

#[derive(Debug, Clone, Copy)]
pub struct Aligner {
    /// Error marker emitted by the weather source for missing readings
    sentinel: f64,
}

impl Aligner {
    pub fn new(sentinel: f64) -> Self {
        Self { sentinel }
    }

    /// Regularize a single device series onto its own grid
    pub fn fill_gaps(&self, target: &Series, step: Duration) -> Result<AlignedSeries> {
        target.require_data()?;
        let step = positive_step(step)?;

        let start = target.observations()[0].timestamp;
        let end = target.observations()[target.len() - 1].timestamp;
        let index = grid(start, end, step);
        let values = fill(place(target, start, step, index.len()), TailFill::Forward);

        debug!(
            series = target.name(),
            points = target.len(),
            slots = index.len(),
            "filled gaps"
        );

        AlignedSeries::new(index, values, None)
    }

    /// Align a device series and a weather series on the union of their ranges at
    /// the finer of their cadences, never coarser than `max_step`
    pub fn align(
        &self,
        target: &Series,
        weather: &Series,
        max_step: Duration,
    ) -> Result<AlignedSeries> {
        target.require_data()?;
        weather.require_data()?;

        let step = [target.cadence(), weather.cadence(), Some(max_step)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(max_step);
        let step = positive_step(step)?;

        let start = target.observations()[0]
            .timestamp
            .min(weather.observations()[0].timestamp);
        let end = target.observations()[target.len() - 1]
            .timestamp
            .max(weather.observations()[weather.len() - 1].timestamp);
        let index = grid(start, end, step);

        let target_values = fill(place(target, start, step, index.len()), TailFill::Forward);
        let weather_values = self.clear_sentinel(fill(
            place(weather, start, step, index.len()),
            TailFill::Forward,
        ));

        debug!(
            target = target.name(),
            weather = weather.name(),
            slots = index.len(),
            step_secs = step.num_seconds(),
            "aligned device and weather series"
        );

        if target_values.len() != weather_values.len() {
            return Err(PipelineError::SeriesLengthMismatch {
                target: target_values.len(),
                exogenous: weather_values.len(),
            });
        }

        AlignedSeries::new(index, target_values, Some(weather_values))
    }

    /// Reindex `series` onto explicit labels, back-filling gaps. Labels without
    /// any later observation follow `tail`.
    pub fn align_to_index(
        &self,
        series: &Series,
        index: &[DateTime<Utc>],
        tail: TailFill,
    ) -> Result<Vec<f64>> {
        let by_time: HashMap<DateTime<Utc>, f64> = series
            .observations()
            .iter()
            .map(|o| (o.timestamp, o.value))
            .collect();
        let slots: Vec<Option<f64>> = index.iter().map(|ts| by_time.get(ts).copied()).collect();

        if tail == TailFill::Forward && slots.iter().all(Option::is_none) {
            return Err(PipelineError::NoData(format!(
                "series '{}' has no values at the requested timestamps",
                series.name()
            )));
        }

        Ok(fill(slots, tail))
    }

    /// Drop raw readings that carry the weather sentinel. Must run before
    /// resampling.
    pub fn mask_sentinel(&self, series: &Series) -> Series {
        let kept: Vec<Observation> = series
            .observations()
            .iter()
            .filter(|o| !self.is_sentinel(o.value))
            .copied()
            .collect();
        let dropped = series.len() - kept.len();
        if dropped > 0 {
            debug!(series = series.name(), dropped, "masked sentinel readings");
        }
        Series::from_observations(series.name(), kept)
    }

    fn is_sentinel(&self, value: f64) -> bool {
        (value - self.sentinel).abs() < 1e-9
    }

    /// Replace the weather sentinel with zero
    pub fn clear_sentinel(&self, values: Vec<f64>) -> Vec<f64> {
        values
            .into_iter()
            .map(|v| if self.is_sentinel(v) { 0.0 } else { v })
            .collect()
    }
}

fn positive_step(step: Duration) -> Result<Duration> {
    if step <= Duration::zero() {
        return Err(PipelineError::InvalidRequest(format!(
            "alignment step must be positive, got {step}"
        )));
    }
    Ok(step)
}

fn grid(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Vec<DateTime<Utc>> {
    let mut index = Vec::new();
    let mut ts = start;
    while ts <= end {
        index.push(ts);
        ts += step;
    }
    index
}

/// Drop each observation into the grid slot at or before it; earlier
/// observations win a shared slot
fn place(series: &Series, start: DateTime<Utc>, step: Duration, len: usize) -> Vec<Option<f64>> {
    let step_secs = step.num_seconds();
    let mut slots = vec![None; len];
    for obs in series.observations() {
        let offset = (obs.timestamp - start).num_seconds();
        if offset < 0 {
            continue;
        }
        let slot = (offset / step_secs) as usize;
        if slot < len && slots[slot].is_none() && obs.value.is_finite() {
            slots[slot] = Some(obs.value);
        }
    }
    slots
}

fn fill(slots: Vec<Option<f64>>, tail: TailFill) -> Vec<f64> {
    let mut filled = slots;
    let mut next: Option<f64> = None;
    for slot in filled.iter_mut().rev() {
        match slot {
            Some(v) => next = Some(*v),
            None => *slot = next,
        }
    }

    let known = filled.iter().rposition(Option::is_some);
    match (tail, known) {
        (_, None) => Vec::new(),
        (TailFill::Truncate, Some(last)) => filled[..=last].iter().flatten().copied().collect(),
        (TailFill::Forward, Some(last)) => {
            let carry = filled[last];
            filled.into_iter().map(|v| v.or(carry).unwrap_or(0.0)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SENTINEL: f64 = -999.0;

    fn at(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 5, 26, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn series(name: &str, points: &[(i64, f64)]) -> Series {
        Series::from_observations(
            name,
            points.iter().map(|(h, v)| Observation::new(at(*h), *v)).collect(),
        )
    }

    fn assert_gap_free(aligned: &AlignedSeries, step: Duration) {
        for pair in aligned.index().windows(2) {
            assert_eq!(pair[1] - pair[0], step);
        }
    }

    #[test]
    fn test_fill_gaps_back_fills() {
        let target = series("meter", &[(0, 1.0), (3, 4.0), (4, 5.0)]);
        let aligned = Aligner::new(SENTINEL).fill_gaps(&target, Duration::hours(1)).unwrap();

        assert_eq!(aligned.target(), &[1.0, 4.0, 4.0, 4.0, 5.0]);
        assert_gap_free(&aligned, Duration::hours(1));
        assert!(aligned.exogenous().is_none());
    }

    #[test]
    fn test_align_union_and_sentinel() {
        let target = series("meter", &[(0, 1.0), (1, 2.0), (2, 3.0), (3, 4.0)]);
        let weather = series("R1", &[(1, 0.5), (3, SENTINEL), (5, 2.0)]);

        let aligned = Aligner::new(SENTINEL)
            .align(&target, &weather, Duration::hours(1))
            .unwrap();

        assert_eq!(aligned.len(), 6);
        assert_eq!(aligned.first_timestamp(), at(0));
        assert_eq!(aligned.last_timestamp(), at(5));
        assert_eq!(aligned.target(), &[1.0, 2.0, 3.0, 4.0, 4.0, 4.0]);
        assert_eq!(aligned.exogenous().unwrap(), &[0.5, 0.5, 0.0, 0.0, 2.0, 2.0]);
        assert_gap_free(&aligned, Duration::hours(1));
    }

    #[test]
    fn test_align_uses_finer_cadence() {
        let target = series("meter", &[(0, 1.0), (2, 3.0), (4, 5.0)]);
        let weather = series("TT_TU", &[(0, 10.0), (1, 11.0), (2, 12.0), (3, 13.0), (4, 14.0)]);

        let aligned = Aligner::new(SENTINEL)
            .align(&target, &weather, Duration::days(1))
            .unwrap();

        assert_eq!(aligned.len(), 5);
        assert_eq!(aligned.target(), &[1.0, 3.0, 3.0, 5.0, 5.0]);
    }

    #[test]
    fn test_align_caps_step_for_sparse_series() {
        let target = series("meter", &[(0, 1.0), (2, 3.0)]);
        let weather = series("TT_TU", &[(0, 10.0), (2, 12.0)]);

        let aligned = Aligner::new(SENTINEL)
            .align(&target, &weather, Duration::hours(1))
            .unwrap();

        assert_eq!(aligned.len(), 3);
        assert_eq!(aligned.target(), &[1.0, 3.0, 3.0]);
        assert_gap_free(&aligned, Duration::hours(1));
    }

    #[test]
    fn test_align_empty_inputs() {
        let aligner = Aligner::new(SENTINEL);
        let empty = Series::empty("meter");
        let weather = series("R1", &[(0, 1.0)]);

        let err = aligner.align(&empty, &weather, Duration::hours(1)).unwrap_err();
        assert_eq!(err.kind(), "NoDataError");
        let err = aligner.fill_gaps(&empty, Duration::hours(1)).unwrap_err();
        assert_eq!(err.kind(), "NoDataError");
    }

    #[test]
    fn test_aligned_series_rejects_mismatched_lengths() {
        let err = AlignedSeries::new(vec![at(0), at(1)], vec![1.0, 2.0], Some(vec![1.0]))
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::SeriesLengthMismatch {
                target: 2,
                exogenous: 1
            }
        );
    }

    #[test]
    fn test_align_to_index_truncates_tail() {
        let held_out = series("meter", &[(0, 1.0), (2, 3.0)]);
        let labels: Vec<_> = (0..5).map(at).collect();

        let values = Aligner::new(SENTINEL)
            .align_to_index(&held_out, &labels, TailFill::Truncate)
            .unwrap();
        assert_eq!(values, vec![1.0, 3.0, 3.0]);
    }

    #[test]
    fn test_align_to_index_forward_fills_tail() {
        let weather = series("TT_TU", &[(1, 7.0)]);
        let labels: Vec<_> = (0..3).map(at).collect();

        let values = Aligner::new(SENTINEL)
            .align_to_index(&weather, &labels, TailFill::Forward)
            .unwrap();
        assert_eq!(values, vec![7.0, 7.0, 7.0]);

        let err = Aligner::new(SENTINEL)
            .align_to_index(&Series::empty("x"), &labels, TailFill::Forward)
            .unwrap_err();
        assert_eq!(err.kind(), "NoDataError");
    }

    #[test]
    fn test_sentinel_never_enters_daily_means() {
        use crate::domain::Resolution;
        use crate::series::Resampler;

        let aligner = Aligner::new(SENTINEL);
        let meter = series("meter", &(0..48).map(|h| (h, 40.0)).collect::<Vec<_>>());
        let weather = series(
            "TT_TU",
            &(0..48)
                .map(|h| (h, if h == 5 { SENTINEL } else { 15.0 }))
                .collect::<Vec<_>>(),
        );

        let daily = Resampler::new(Resolution::Daily).anchored_at(at(0));
        let target = daily.resample(&meter);
        let weather = daily.resample(&aligner.mask_sentinel(&weather));
        let aligned = aligner
            .align(&target, &weather, Resolution::Daily.step())
            .unwrap();

        assert_eq!(aligned.exogenous(), Some(&[15.0, 15.0][..]));
    }

    #[test]
    fn test_mask_sentinel_drops_only_markers() {
        let weather = series("TT_TU", &[(0, 1.0), (1, SENTINEL), (2, 0.0), (3, -998.5)]);
        let masked = Aligner::new(SENTINEL).mask_sentinel(&weather);

        assert_eq!(masked.name(), "TT_TU");
        assert_eq!(masked.values(), vec![1.0, 0.0, -998.5]);
    }
}
