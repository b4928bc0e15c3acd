//! Tabulated loss for integer scores.

use ndarray::{Array1, ArrayView1};

use super::{direct::DirectLoss, gradient_from_scores, logistic_loss, LossComputation, LossStrategy};
use crate::coefficients::CoefficientSet;
use crate::data::Dataset;
use crate::error::{Result, RiskSlimError};

/// Largest table the lookup strategy will allocate.
const MAX_TABLE_SIZE: usize = 10_000_000;

/// Loss lookup over every realizable integer score.
///
/// Valid when the data are integer-valued and every coefficient is a bounded
/// integer, so every score is an integer in `[min_score, max_score]`. Scores
/// outside the table (e.g. from fractional relaxations) are evaluated directly.
#[derive(Debug, Clone)]
pub struct LookupLoss<'a> {
    direct: DirectLoss<'a>,
    data: &'a Dataset,
    min_score: i64,
    table: Vec<f64>,
}

impl<'a> LookupLoss<'a> {
    pub fn new(data: &'a Dataset, coefficients: &CoefficientSet) -> Result<Self> {
        if !coefficients.all_integer_bounded() {
            return Err(RiskSlimError::config(
                "lookup loss requires bounded integer coefficients",
            ));
        }
        if !data.is_integer_valued() {
            return Err(RiskSlimError::config(
                "lookup loss requires an integer-valued feature matrix",
            ));
        }

        let (z_min, z_max) = data.z_column_ranges();
        let mut min_score = 0.0;
        let mut max_score = 0.0;
        let ranges = z_min.iter().zip(z_max.iter());
        for (var, (lo, hi)) in coefficients.variables().iter().zip(ranges) {
            let edges = [lo * var.lb, lo * var.ub, hi * var.lb, hi * var.ub];
            min_score += edges.iter().cloned().fold(f64::INFINITY, f64::min);
            max_score += edges.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        }
        let size = (max_score - min_score) as usize + 1;
        if size > MAX_TABLE_SIZE {
            return Err(RiskSlimError::config(format!(
                "lookup table would need {} entries",
                size
            )));
        }

        let min_score = min_score as i64;
        let table = (0..size)
            .map(|k| logistic_loss((min_score + k as i64) as f64))
            .collect();
        log::debug!(
            "lookup loss table covers scores [{}, {}]",
            min_score,
            min_score + size as i64 - 1
        );

        Ok(Self {
            direct: DirectLoss::new(data),
            data,
            min_score,
            table,
        })
    }

    fn row_loss(&self, score: f64) -> f64 {
        if score.fract() == 0.0 {
            let offset = score as i64 - self.min_score;
            if offset >= 0 {
                if let Some(&value) = self.table.get(offset as usize) {
                    return value;
                }
            }
        }
        logistic_loss(score)
    }
}

impl LossStrategy for LookupLoss<'_> {
    fn scores(&self, rho: &[f64]) -> Array1<f64> {
        self.direct.scores(rho)
    }

    fn loss_from_scores(&self, scores: ArrayView1<'_, f64>) -> f64 {
        let total: f64 = scores
            .iter()
            .zip(self.data.weights().iter())
            .map(|(&s, &w)| w * self.row_loss(s))
            .sum();
        total / self.data.n_samples() as f64
    }

    fn loss_and_gradient(&mut self, rho: &[f64]) -> (f64, Vec<f64>) {
        let scores = self.scores(rho);
        let loss = self.loss_from_scores(scores.view());
        (loss, gradient_from_scores(self.data, scores.view()))
    }

    fn kind(&self) -> LossComputation {
        LossComputation::Lookup
    }
}
