//! Model training
//!
//! Differencing orders are fixed first by unit root tests; the ARMA orders are
//! then chosen by a stepwise search that starts from a handful of small models
//! and walks to the neighbour with lower AIC until no neighbour improves.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use super::sarimax::{SarimaOrder, SarimaxModel};
use super::stationarity::{ndiffs, nsdiffs};
use crate::error::{PipelineError, Result};

/// Search bounds for automatic order selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainerConfig {
    pub seasonal_period: usize,
    pub max_d: usize,
    pub max_seasonal_d: usize,
    pub max_p: usize,
    pub max_q: usize,
    pub max_seasonal_p: usize,
    pub max_seasonal_q: usize,
    /// Upper bound on p + q + P + Q
    pub max_order: usize,
    pub max_fits: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            seasonal_period: 24,
            max_d: 2,
            max_seasonal_d: 2,
            max_p: 5,
            max_q: 5,
            max_seasonal_p: 2,
            max_seasonal_q: 2,
            max_order: 5,
            max_fits: 100,
        }
    }
}

/// Winning model of a search
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: SarimaxModel,
    pub duration: Duration,
    pub candidates_evaluated: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ModelTrainer {
    config: TrainerConfig,
}

/// ARMA part of an order; differencing stays fixed during the search
type ArmaOrders = (usize, usize, usize, usize);

impl ModelTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Select and fit a model for `target`, optionally with one regressor aligned
    /// to it
    pub fn train(&self, target: &[f64], exog: Option<&[f64]>) -> Result<TrainedModel> {
        if target.is_empty() {
            return Err(PipelineError::NoData("training series is empty".into()));
        }
        if let Some(x) = exog {
            if x.len() != target.len() {
                return Err(PipelineError::SeriesLengthMismatch {
                    target: target.len(),
                    exogenous: x.len(),
                });
            }
        }
        if target.iter().chain(exog.unwrap_or(&[])).any(|v| !v.is_finite()) {
            return Err(PipelineError::TrainingFailed(
                "training data contains non-finite values".into(),
            ));
        }

        let started = Instant::now();
        let period = self.config.seasonal_period;

        let (d, seasonal_d) = self.differencing_orders(target);
        debug!(d, seasonal_d, period, points = target.len(), "selected differencing orders");

        let mut search = Search {
            trainer: self,
            target,
            exog,
            d,
            seasonal_d,
            visited: HashSet::new(),
            best: None,
        };

        for start in self.starting_points() {
            search.consider(start);
        }

        let mut improved = search.best.is_some();
        while improved && search.visited.len() < self.config.max_fits {
            improved = false;
            let Some(current) = search.best.as_ref().map(|m| arma_orders(&m.order())) else {
                break;
            };
            for candidate in self.neighbours(current) {
                if search.visited.len() >= self.config.max_fits {
                    break;
                }
                if search.consider(candidate) {
                    improved = true;
                    break;
                }
            }
        }

        let candidates_evaluated = search.visited.len();
        let model = search.best.ok_or_else(|| {
            PipelineError::TrainingFailed(format!(
                "none of {candidates_evaluated} candidate models could be fitted to {} points",
                target.len()
            ))
        })?;
        let duration = started.elapsed();

        info!(
            order = %model.order(),
            aic = model.aic(),
            candidates = candidates_evaluated,
            duration_ms = duration.as_millis() as u64,
            "model trained"
        );

        Ok(TrainedModel {
            model,
            duration,
            candidates_evaluated,
        })
    }

    /// `d` from ADF and `D` from OCSB, both tested on the undifferenced series
    fn differencing_orders(&self, target: &[f64]) -> (usize, usize) {
        let d = ndiffs(target, self.config.max_d);
        let seasonal_d = nsdiffs(target, self.config.seasonal_period, self.config.max_seasonal_d);
        (d, seasonal_d)
    }

    fn starting_points(&self) -> Vec<ArmaOrders> {
        [(2, 2, 1, 1), (0, 0, 0, 0), (1, 0, 1, 0), (0, 1, 0, 1)]
            .into_iter()
            .map(|o| self.restrict(o))
            .filter(|o| self.within_bounds(*o))
            .collect()
    }

    fn neighbours(&self, (p, q, sp, sq): ArmaOrders) -> Vec<ArmaOrders> {
        let (p, q, sp, sq) = (p as i64, q as i64, sp as i64, sq as i64);
        let mut out = Vec::new();
        for delta in [-1, 1] {
            out.push((p, q, sp + delta, sq));
        }
        for delta in [-1, 1] {
            out.push((p, q, sp, sq + delta));
        }
        for delta in [-1, 1] {
            out.push((p, q, sp + delta, sq + delta));
        }
        for delta in [-1, 1] {
            out.push((p + delta, q, sp, sq));
        }
        for delta in [-1, 1] {
            out.push((p, q + delta, sp, sq));
        }
        for delta in [-1, 1] {
            out.push((p + delta, q + delta, sp, sq));
        }

        out.into_iter()
            .filter(|(a, b, c, d)| *a >= 0 && *b >= 0 && *c >= 0 && *d >= 0)
            .map(|(a, b, c, d)| (a as usize, b as usize, c as usize, d as usize))
            .map(|o| self.restrict(o))
            .filter(|o| self.within_bounds(*o))
            .collect()
    }

    /// Zero the seasonal orders when there is no seasonal cycle
    fn restrict(&self, (p, q, sp, sq): ArmaOrders) -> ArmaOrders {
        if self.config.seasonal_period > 1 {
            (p, q, sp, sq)
        } else {
            (p, q, 0, 0)
        }
    }

    fn within_bounds(&self, (p, q, sp, sq): ArmaOrders) -> bool {
        let c = &self.config;
        p <= c.max_p
            && q <= c.max_q
            && sp <= c.max_seasonal_p
            && sq <= c.max_seasonal_q
            && p + q + sp + sq <= c.max_order
    }
}

fn arma_orders(order: &SarimaOrder) -> ArmaOrders {
    (order.p, order.q, order.seasonal_p, order.seasonal_q)
}

struct Search<'a> {
    trainer: &'a ModelTrainer,
    target: &'a [f64],
    exog: Option<&'a [f64]>,
    d: usize,
    seasonal_d: usize,
    visited: HashSet<ArmaOrders>,
    best: Option<SarimaxModel>,
}

impl Search<'_> {
    /// Fit `orders` unless already tried; true when it became the new best
    fn consider(&mut self, orders: ArmaOrders) -> bool {
        if !self.visited.insert(orders) {
            return false;
        }
        let (p, q, sp, sq) = orders;
        let order = SarimaOrder::new(
            (p, self.d, q),
            (sp, self.seasonal_d, sq),
            self.trainer.config.seasonal_period,
        );

        match SarimaxModel::fit(order, self.target, self.exog) {
            Ok(model) => {
                let better = self
                    .best
                    .as_ref()
                    .map_or(true, |best| model.aic() < best.aic());
                trace!(order = %order, aic = model.aic(), better, "evaluated candidate");
                if better {
                    self.best = Some(model);
                }
                better
            }
            Err(e) => {
                trace!(order = %order, error = %e, "candidate skipped");
                false
            }
        }
    }
}
