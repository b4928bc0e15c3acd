//! Score caching with incremental single-coordinate updates.
//!
//! Rounding and polishing perturb one coordinate at a time, so keeping the
//! last score vector turns each re-evaluation into an O(n) axpy.

use ndarray::{Array1, ArrayView1, Zip};

use super::{direct::DirectLoss, gradient_from_scores, LossComputation, LossStrategy};
use crate::data::Dataset;

#[derive(Debug, Clone)]
pub struct CachedLoss<'a> {
    direct: DirectLoss<'a>,
    data: &'a Dataset,
    rho: Vec<f64>,
    scores: Array1<f64>,
    trial: Array1<f64>,
    incremental_updates: usize,
}

impl<'a> CachedLoss<'a> {
    pub fn new(data: &'a Dataset) -> Self {
        let p = data.n_columns();
        Self {
            direct: DirectLoss::new(data),
            data,
            rho: vec![0.0; p],
            scores: Array1::zeros(data.n_samples()),
            trial: Array1::zeros(data.n_samples()),
            incremental_updates: 0,
        }
    }

    /// Bring the cached scores in line with `rho`.
    fn sync(&mut self, rho: &[f64]) {
        let mut changed = self
            .rho
            .iter()
            .zip(rho)
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(j, _)| j);
        match (changed.next(), changed.next()) {
            (None, _) => {}
            (Some(j), None) => {
                let step = rho[j] - self.rho[j];
                Zip::from(&mut self.scores)
                    .and(self.data.z().column(j))
                    .for_each(|s, &z| *s += step * z);
                self.rho[j] = rho[j];
                self.incremental_updates += 1;
            }
            _ => {
                self.scores = self.direct.scores(rho);
                self.rho.copy_from_slice(rho);
            }
        }
    }
}

impl LossStrategy for CachedLoss<'_> {
    fn scores(&self, rho: &[f64]) -> Array1<f64> {
        if self.rho.as_slice() == rho {
            self.scores.clone()
        } else {
            self.direct.scores(rho)
        }
    }

    fn loss_from_scores(&self, scores: ArrayView1<'_, f64>) -> f64 {
        self.direct.loss_from_scores(scores)
    }

    fn loss(&mut self, rho: &[f64]) -> f64 {
        self.sync(rho);
        self.direct.loss_from_scores(self.scores.view())
    }

    fn loss_and_gradient(&mut self, rho: &[f64]) -> (f64, Vec<f64>) {
        self.sync(rho);
        let loss = self.direct.loss_from_scores(self.scores.view());
        (loss, gradient_from_scores(self.data, self.scores.view()))
    }

    fn loss_with_coordinate(&mut self, rho: &[f64], j: usize, value: f64) -> f64 {
        self.sync(rho);
        let step = value - self.rho[j];
        Zip::from(&mut self.trial)
            .and(&self.scores)
            .and(self.data.z().column(j))
            .for_each(|t, &s, &z| *t = s + step * z);
        self.incremental_updates += 1;
        self.direct.loss_from_scores(self.trial.view())
    }

    fn incremental_updates(&self) -> usize {
        self.incremental_updates
    }

    fn kind(&self) -> LossComputation {
        LossComputation::Fast
    }
}
