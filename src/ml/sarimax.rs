//! Seasonal ARIMA with an optional exogenous regressor
//!
//! Estimation follows Hannan–Rissanen: a long autoregression supplies proxy
//! innovations, then the ARMA coefficients come out of a single least squares
//! regression on the differenced series. Seasonal lags are treated additively
//! (lag `k * period` for each seasonal order `k`). The likelihood used for AIC is
//! the Gaussian conditional sum of squares.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt;
use tracing::trace;

use super::regression::ols;
use super::stationarity::{diff, is_constant};
use super::ModelError;

const MIN_SIGMA2: f64 = 1e-12;

/// (p, d, q)(P, D, Q)[period]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SarimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub period: usize,
}

impl SarimaOrder {
    pub fn new(
        (p, d, q): (usize, usize, usize),
        (seasonal_p, seasonal_d, seasonal_q): (usize, usize, usize),
        period: usize,
    ) -> Self {
        let seasonal = period > 1;
        Self {
            p,
            d,
            q,
            seasonal_p: if seasonal { seasonal_p } else { 0 },
            seasonal_d: if seasonal { seasonal_d } else { 0 },
            seasonal_q: if seasonal { seasonal_q } else { 0 },
            period,
        }
    }

    fn lags(&self, order: usize, seasonal_order: usize) -> Vec<usize> {
        let mut lags: Vec<usize> = (1..=order).collect();
        if self.period > 1 {
            lags.extend((1..=seasonal_order).map(|k| k * self.period));
        }
        lags.sort_unstable();
        lags.dedup();
        lags
    }

    pub fn ar_lags(&self) -> Vec<usize> {
        self.lags(self.p, self.seasonal_p)
    }

    pub fn ma_lags(&self) -> Vec<usize> {
        self.lags(self.q, self.seasonal_q)
    }

    /// A constant is estimated unless the series is differenced twice or more
    pub fn with_intercept(&self) -> bool {
        self.d + self.seasonal_d < 2
    }

    /// Observations lost to differencing
    pub fn differencing_loss(&self) -> usize {
        self.d + self.seasonal_d * self.period
    }

    /// Coefficients of (1 - B)^d (1 - B^s)^D, indexed by power of B
    pub fn differencing_polynomial(&self) -> Vec<f64> {
        let mut poly = vec![1.0];
        for _ in 0..self.d {
            poly = poly_mul(&poly, &[1.0, -1.0]);
        }
        if self.period > 0 {
            let mut seasonal = vec![0.0; self.period + 1];
            seasonal[0] = 1.0;
            seasonal[self.period] = -1.0;
            for _ in 0..self.seasonal_d {
                poly = poly_mul(&poly, &seasonal);
            }
        }
        poly
    }

    pub fn difference(&self, x: &[f64]) -> Vec<f64> {
        let mut out = x.to_vec();
        for _ in 0..self.d {
            out = diff(&out, 1);
        }
        for _ in 0..self.seasonal_d {
            out = diff(&out, self.period);
        }
        out
    }
}

impl fmt::Display for SarimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SARIMAX({},{},{})({},{},{})[{}]",
            self.p, self.d, self.q, self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period
        )
    }
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Order of the long autoregression, at least `max_lag`
fn long_ar_order(nw: usize, max_lag: usize) -> usize {
    let rule = (12.0 * (nw as f64 / 100.0).powf(0.25)).ceil() as usize;
    max_lag.max(rule.min(nw.saturating_sub(1) / 2))
}

/// Proxy innovations from an AR(`m`) fit; zero for the first `m` slots
fn long_ar_residuals(w: &[f64], z: Option<&[f64]>, m: usize) -> Result<Vec<f64>, ModelError> {
    let design: Vec<Vec<f64>> = (m..w.len())
        .map(|t| {
            let mut row = vec![1.0];
            if let Some(z) = z {
                row.push(z[t]);
            }
            row.extend((1..=m).map(|l| w[t - l]));
            row
        })
        .collect();
    let fit = ols(&design, &w[m..])?;

    let mut innovations = vec![0.0; m];
    innovations.extend(fit.residuals);
    Ok(innovations)
}

/// Point forecasts and interval bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub point: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarimaxModel {
    order: SarimaOrder,
    intercept: f64,
    exog_coef: Option<f64>,
    ar: Vec<(usize, f64)>,
    ma: Vec<(usize, f64)>,
    sigma2: f64,
    aic: f64,
    /// Training history in original units, needed to integrate forecasts
    endog: Vec<f64>,
    exog: Option<Vec<f64>>,
    /// Innovations on the differenced scale
    residuals: Vec<f64>,
}

impl SarimaxModel {
    pub fn fit(
        order: SarimaOrder,
        endog: &[f64],
        exog: Option<&[f64]>,
    ) -> Result<Self, ModelError> {
        if let Some(x) = exog {
            if x.len() != endog.len() {
                return Err(ModelError::ExogenousMismatch(format!(
                    "{} exogenous values for {} observations",
                    x.len(),
                    endog.len()
                )));
            }
        }
        if endog.iter().chain(exog.unwrap_or(&[])).any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("training data".into()));
        }

        let w = order.difference(endog);
        let z = exog.map(|x| order.difference(x));
        let nw = w.len();
        if nw < 3 {
            return Err(ModelError::InsufficientData {
                needed: order.differencing_loss() + 3,
                got: endog.len(),
            });
        }

        // An exogenous column that is flat after differencing carries no signal
        // and would be collinear with the constant.
        let z = z.filter(|z| !is_constant(z));
        let fixed_exog = exog.is_some() && z.is_none();

        let ar_lags = order.ar_lags();
        let ma_lags = order.ma_lags();
        let max_ar = ar_lags.last().copied().unwrap_or(0);
        let max_ma = ma_lags.last().copied().unwrap_or(0);

        let (innovations, start) = if ma_lags.is_empty() {
            (vec![0.0; nw], max_ar)
        } else {
            let m = long_ar_order(nw, max_ar.max(max_ma));
            if nw <= 2 * m + 2 {
                return Err(ModelError::InsufficientData {
                    needed: 2 * m + 3 + order.differencing_loss(),
                    got: endog.len(),
                });
            }
            (long_ar_residuals(&w, z.as_deref(), m)?, max_ar.max(m + max_ma))
        };

        let with_intercept = order.with_intercept();
        let design: Vec<Vec<f64>> = (start..nw)
            .map(|t| {
                let mut row = Vec::new();
                if with_intercept {
                    row.push(1.0);
                }
                if let Some(z) = &z {
                    row.push(z[t]);
                }
                row.extend(ar_lags.iter().map(|l| w[t - l]));
                row.extend(ma_lags.iter().map(|l| innovations[t - l]));
                row
            })
            .collect();
        let k = with_intercept as usize + z.is_some() as usize + ar_lags.len() + ma_lags.len();

        let coefficients = if k == 0 {
            Vec::new()
        } else {
            if design.len() <= k + 1 {
                return Err(ModelError::InsufficientData {
                    needed: start + k + 2 + order.differencing_loss(),
                    got: endog.len(),
                });
            }
            let target: Vec<f64> = w[start..].to_vec();
            ols(&design, &target)?.coefficients
        };

        let mut coef = coefficients.into_iter();
        let intercept = if with_intercept { coef.next().unwrap_or(0.0) } else { 0.0 };
        let exog_coef = match (&z, fixed_exog) {
            (Some(_), _) => coef.next(),
            (None, true) => Some(0.0),
            (None, false) => None,
        };
        let ar: Vec<(usize, f64)> = ar_lags.iter().map(|l| (*l, coef.next().unwrap_or(0.0))).collect();
        let ma: Vec<(usize, f64)> = ma_lags.iter().map(|l| (*l, coef.next().unwrap_or(0.0))).collect();

        let mut model = Self {
            order,
            intercept,
            exog_coef,
            ar,
            ma,
            sigma2: 0.0,
            aic: f64::INFINITY,
            endog: endog.to_vec(),
            exog: exog.map(<[f64]>::to_vec),
            residuals: Vec::new(),
        };

        let z_full = z.unwrap_or_else(|| vec![0.0; nw]);
        let residuals = model.css_residuals(&w, &z_full, max_ar);
        let n_eff = nw - max_ar;
        let sse: f64 = residuals[max_ar..].iter().map(|e| e * e).sum();
        let sigma2 = sse / n_eff as f64;
        if !sigma2.is_finite() {
            return Err(ModelError::NonFinite("residual variance".into()));
        }
        let sigma2 = sigma2.max(MIN_SIGMA2);

        // Conditional log-likelihood, scaled to the full differenced sample so that
        // candidates with different AR spans stay comparable
        let log_likelihood = -0.5 * nw as f64 * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let aic = -2.0 * log_likelihood + 2.0 * (k + 1) as f64;

        model.sigma2 = sigma2;
        model.aic = aic;
        model.residuals = residuals;

        trace!(order = %order, aic, sigma2, fixed_exog, "fitted candidate");
        Ok(model)
    }

    fn css_residuals(&self, w: &[f64], z: &[f64], max_ar: usize) -> Vec<f64> {
        let beta = self.exog_coef.unwrap_or(0.0);
        let mut e = vec![0.0; w.len()];
        for t in max_ar..w.len() {
            let ar: f64 = self.ar.iter().map(|(l, phi)| phi * w[t - l]).sum();
            let ma: f64 = self
                .ma
                .iter()
                .filter(|(l, _)| *l <= t)
                .map(|(l, theta)| theta * e[t - l])
                .sum();
            e[t] = w[t] - self.intercept - beta * z[t] - ar - ma;
        }
        e
    }

    /// Forecast `horizon` steps past the training data with `1 - alpha` intervals
    pub fn predict(
        &self,
        horizon: usize,
        future_exog: Option<&[f64]>,
        alpha: f64,
    ) -> Result<Prediction, ModelError> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ModelError::InvalidParameter(format!(
                "alpha must lie in (0, 1), got {alpha}"
            )));
        }
        let future_z = self.future_exogenous(horizon, future_exog)?;
        if horizon == 0 {
            return Ok(Prediction {
                point: Vec::new(),
                lower: Vec::new(),
                upper: Vec::new(),
            });
        }

        let mut w = self.order.difference(&self.endog);
        let mut e = self.residuals.clone();
        let nw = w.len();
        let beta = self.exog_coef.unwrap_or(0.0);

        for h in 0..horizon {
            let t = nw + h;
            let ar: f64 = self
                .ar
                .iter()
                .filter(|(l, _)| *l <= t)
                .map(|(l, phi)| phi * w[t - l])
                .sum();
            let ma: f64 = self
                .ma
                .iter()
                .filter(|(l, _)| *l <= t)
                .map(|(l, theta)| theta * e[t - l])
                .sum();
            w.push(self.intercept + beta * future_z[h] + ar + ma);
            e.push(0.0);
        }

        let delta = self.order.differencing_polynomial();
        let mut y = self.endog.clone();
        let n = y.len();
        for h in 0..horizon {
            let t = n + h;
            let lagged: f64 = delta
                .iter()
                .enumerate()
                .skip(1)
                .map(|(j, d)| d * y[t - j])
                .sum();
            y.push(w[nw + h] - lagged);
        }
        let point = y[n..].to_vec();
        if point.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("forecast".into()));
        }

        let psi = self.psi_weights(horizon);
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ModelError::InvalidParameter(e.to_string()))?;
        let z = normal.inverse_cdf(1.0 - alpha / 2.0);

        let mut cumulative = 0.0;
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for (h, value) in point.iter().enumerate() {
            cumulative += psi[h] * psi[h];
            let half_width = z * (self.sigma2 * cumulative).sqrt();
            lower.push(value - half_width);
            upper.push(value + half_width);
        }

        Ok(Prediction { point, lower, upper })
    }

    fn future_exogenous(
        &self,
        horizon: usize,
        future_exog: Option<&[f64]>,
    ) -> Result<Vec<f64>, ModelError> {
        match (&self.exog, future_exog) {
            (None, None) => Ok(vec![0.0; horizon]),
            (None, Some(_)) => Err(ModelError::ExogenousMismatch(
                "model was trained without an exogenous regressor".into(),
            )),
            (Some(_), None) => Err(ModelError::ExogenousMismatch(
                "model requires future exogenous values".into(),
            )),
            (Some(history), Some(future)) => {
                if future.len() != horizon {
                    return Err(ModelError::ExogenousMismatch(format!(
                        "{} future exogenous values for horizon {horizon}",
                        future.len()
                    )));
                }
                if future.iter().any(|v| !v.is_finite()) {
                    return Err(ModelError::NonFinite("future exogenous values".into()));
                }
                let joined: Vec<f64> = history.iter().chain(future).copied().collect();
                let differenced = self.order.difference(&joined);
                Ok(differenced[differenced.len() - horizon..].to_vec())
            }
        }
    }

    /// MA(∞) weights of the integrated model
    fn psi_weights(&self, horizon: usize) -> Vec<f64> {
        let mut ar_poly = vec![0.0; self.ar.last().map(|(l, _)| l + 1).unwrap_or(1)];
        ar_poly[0] = 1.0;
        for (l, phi) in &self.ar {
            ar_poly[*l] -= phi;
        }
        let full = poly_mul(&ar_poly, &self.order.differencing_polynomial());

        let mut theta = vec![0.0; horizon];
        for (l, t) in &self.ma {
            if *l < horizon {
                theta[*l] = *t;
            }
        }

        let mut psi = vec![0.0; horizon];
        psi[0] = 1.0;
        for j in 1..horizon {
            let mut value = theta[j];
            for i in 1..full.len().min(j + 1) {
                value -= full[i] * psi[j - i];
            }
            psi[j] = value;
        }
        psi
    }

    pub fn order(&self) -> SarimaOrder {
        self.order
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn exog_coef(&self) -> Option<f64> {
        self.exog_coef
    }

    pub fn ar_coefficients(&self) -> &[(usize, f64)] {
        &self.ar
    }

    pub fn ma_coefficients(&self) -> &[(usize, f64)] {
        &self.ma
    }

    pub fn nobs(&self) -> usize {
        self.endog.len()
    }

    pub fn has_exogenous(&self) -> bool {
        self.exog.is_some()
    }
}
