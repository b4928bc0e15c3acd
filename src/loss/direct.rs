//! Full evaluation of the logistic loss on every call.

use ndarray::{Array1, ArrayView1};

use super::{gradient_from_scores, logistic_loss, LossComputation, LossStrategy};
use crate::data::Dataset;

/// Computes scores and loss from scratch each time.
#[derive(Debug, Clone)]
pub struct DirectLoss<'a> {
    data: &'a Dataset,
}

impl<'a> DirectLoss<'a> {
    pub fn new(data: &'a Dataset) -> Self {
        Self { data }
    }
}

impl LossStrategy for DirectLoss<'_> {
    fn scores(&self, rho: &[f64]) -> Array1<f64> {
        self.data.z().dot(&ArrayView1::from(rho))
    }

    fn loss_from_scores(&self, scores: ArrayView1<'_, f64>) -> f64 {
        let total: f64 = scores
            .iter()
            .zip(self.data.weights().iter())
            .map(|(&s, &w)| w * logistic_loss(s))
            .sum();
        total / self.data.n_samples() as f64
    }

    fn loss_and_gradient(&mut self, rho: &[f64]) -> (f64, Vec<f64>) {
        let scores = self.scores(rho);
        let loss = self.loss_from_scores(scores.view());
        (loss, gradient_from_scores(self.data, scores.view()))
    }

    fn kind(&self) -> LossComputation {
        LossComputation::Normal
    }
}
