//! Ordinary least squares on small dense design matrices

use nalgebra::{DMatrix, DVector};

use super::ModelError;

/// Result of an OLS fit
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Residual variance with `n - k` degrees of freedom
    pub sigma2: f64,
}

impl OlsFit {
    /// t statistic of coefficient `j`
    pub fn t_value(&self, j: usize) -> Option<f64> {
        let se = *self.std_errors.get(j)?;
        if se > 0.0 && se.is_finite() {
            Some(self.coefficients[j] / se)
        } else {
            None
        }
    }
}

/// Regress `y` on the rows of `design`. Rows must all have the same width.
pub fn ols(design: &[Vec<f64>], y: &[f64]) -> Result<OlsFit, ModelError> {
    let n = design.len();
    let k = design.first().map(Vec::len).unwrap_or(0);
    if k == 0 {
        return Err(ModelError::InsufficientData { needed: 1, got: 0 });
    }
    if n <= k || y.len() != n {
        return Err(ModelError::InsufficientData {
            needed: k + 1,
            got: n.min(y.len()),
        });
    }

    let x = DMatrix::from_fn(n, k, |i, j| design[i][j]);
    let yv = DVector::from_column_slice(y);

    let xt = x.transpose();
    let xtx_inv = (&xt * &x).try_inverse().ok_or(ModelError::Singular)?;
    let beta = &xtx_inv * (&xt * &yv);
    let residuals = &yv - &x * &beta;

    let sigma2 = residuals.norm_squared() / (n - k) as f64;
    if !sigma2.is_finite() || beta.iter().any(|b| !b.is_finite()) {
        return Err(ModelError::NonFinite("least squares estimate".into()));
    }

    let std_errors = (0..k)
        .map(|j| (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt())
        .collect();

    Ok(OlsFit {
        coefficients: beta.iter().copied().collect(),
        std_errors,
        residuals: residuals.iter().copied().collect(),
        sigma2,
    })
}
