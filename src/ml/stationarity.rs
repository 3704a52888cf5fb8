//! Differencing-order estimation
//!
//! `ndiffs` repeats augmented Dickey–Fuller tests, `nsdiffs` repeats the
//! Osborn–Chui–Smith–Birchenhall seasonal unit root test.

use tracing::trace;

use super::regression::ols;

/// First difference at `lag`
pub fn diff(x: &[f64], lag: usize) -> Vec<f64> {
    if lag == 0 || x.len() <= lag {
        return Vec::new();
    }
    x.iter().skip(lag).zip(x.iter()).map(|(a, b)| a - b).collect()
}

pub fn is_constant(x: &[f64]) -> bool {
    let (min, max) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    x.is_empty() || (max - min).abs() < 1e-12
}

/// ADF t statistic with a constant and `lags` lagged differences
pub fn adf_statistic(x: &[f64], lags: usize) -> Option<f64> {
    let dx = diff(x, 1);
    if dx.len() <= lags {
        return None;
    }

    let mut design = Vec::with_capacity(dx.len() - lags);
    let mut y = Vec::with_capacity(dx.len() - lags);
    for i in lags..dx.len() {
        let mut row = Vec::with_capacity(2 + lags);
        row.push(1.0);
        row.push(x[i]);
        row.extend((1..=lags).map(|j| dx[i - j]));
        design.push(row);
        y.push(dx[i]);
    }

    ols(&design, &y).ok()?.t_value(1)
}

/// MacKinnon's 5% response-surface critical value, constant and no trend
pub fn adf_critical_value(nobs: usize) -> f64 {
    let n = nobs.max(1) as f64;
    -2.8621 - 2.738 / n - 8.36 / (n * n)
}

fn adf_should_diff(x: &[f64]) -> bool {
    let lags = ((x.len().saturating_sub(1)) as f64).cbrt().trunc() as usize;
    match adf_statistic(x, lags) {
        Some(stat) => {
            let crit = adf_critical_value(x.len());
            trace!(stat, crit, lags, "adf test");
            stat >= crit
        }
        None => false,
    }
}

/// Number of first differences needed for stationarity, at most `max_d`
pub fn ndiffs(x: &[f64], max_d: usize) -> usize {
    if is_constant(x) {
        return 0;
    }

    let mut d = 0;
    let mut current = x.to_vec();
    while d < max_d && adf_should_diff(&current) {
        d += 1;
        current = diff(&current, 1);
        if is_constant(&current) {
            break;
        }
    }
    d
}

/// OCSB t statistic on the seasonal regressor (no AR augmentation)
pub fn ocsb_statistic(x: &[f64], period: usize) -> Option<f64> {
    let seasonal = diff(x, period);
    let y = diff(&seasonal, 1);
    if y.len() < 4 {
        return None;
    }
    let mean_y = y.iter().sum::<f64>() / y.len() as f64;

    let first = diff(x, 1);
    let design: Vec<Vec<f64>> = (0..y.len())
        .map(|t| vec![seasonal[t] - mean_y, first[t] - mean_y])
        .collect();

    ols(&design, &y).ok()?.t_value(1)
}

/// Critical value of the OCSB test for seasonal period `period`
pub fn ocsb_critical_value(period: usize) -> f64 {
    let log_m = (period as f64).ln() - 0.7656451;
    -0.2937411 * (-0.2850853 * log_m - 0.05983644 * log_m * log_m).exp() - 1.652202
}

fn ocsb_should_diff(x: &[f64], period: usize) -> bool {
    if x.len() < 2 * period + 2 {
        return false;
    }
    match ocsb_statistic(x, period) {
        Some(stat) => {
            let crit = ocsb_critical_value(period);
            trace!(stat, crit, period, "ocsb test");
            stat > crit
        }
        None => false,
    }
}

/// Number of seasonal differences needed, at most `max_seasonal_d`
pub fn nsdiffs(x: &[f64], period: usize, max_seasonal_d: usize) -> usize {
    if period <= 1 || is_constant(x) {
        return 0;
    }

    let mut seasonal_d = 0;
    let mut current = x.to_vec();
    while seasonal_d < max_seasonal_d && ocsb_should_diff(&current, period) {
        seasonal_d += 1;
        current = diff(&current, period);
        if is_constant(&current) {
            break;
        }
    }
    seasonal_d
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-noise in [-0.5, 0.5)
    fn noise(i: usize) -> f64 {
        (((i * 7919 + 13) % 1009) as f64 / 1009.0) - 0.5
    }

    #[test]
    fn test_diff() {
        assert_eq!(diff(&[1.0, 4.0, 9.0], 1), vec![3.0, 5.0]);
        assert_eq!(diff(&[1.0, 2.0, 3.0, 5.0], 2), vec![2.0, 3.0]);
        assert!(diff(&[1.0], 1).is_empty());
    }

    #[test]
    fn test_constant_series_needs_no_differencing() {
        let x = vec![4.2; 50];
        assert_eq!(ndiffs(&x, 2), 0);
        assert_eq!(nsdiffs(&x, 24, 2), 0);
    }

    #[test]
    fn test_white_noise_is_stationary() {
        let x: Vec<f64> = (0..200).map(noise).collect();
        assert_eq!(ndiffs(&x, 2), 0);
    }

    #[test]
    fn test_random_walk_needs_one_difference() {
        let mut level = 0.0;
        let x: Vec<f64> = (0..200)
            .map(|i| {
                level += noise(i) + 0.3;
                level
            })
            .collect();
        assert!(ndiffs(&x, 2) >= 1);
    }

    #[test]
    fn test_short_series_skips_seasonal_test() {
        let x: Vec<f64> = (0..30).map(noise).collect();
        assert_eq!(nsdiffs(&x, 24, 2), 0);
    }

    #[test]
    fn test_ocsb_critical_value_for_daily_cycle() {
        let crit = ocsb_critical_value(24);
        assert!(crit < -1.7 && crit > -1.8, "crit = {crit}");
    }
}
