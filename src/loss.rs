//! Logistic loss oracle.
//!
//! The loss of a coefficient vector `rho` is the weighted mean logistic loss
//! `L(rho) = sum_i w_i log(1 + exp(-z_i . rho)) / n` with `z_i = y_i x_i`.
//! Three interchangeable strategies compute it:
//!
//! - [`DirectLoss`]: full evaluation on every call.
//! - [`CachedLoss`]: keeps the last score vector and updates it in O(n) when a
//!   single coordinate changes.
//! - [`LookupLoss`]: tabulates the loss of every realizable integer score;
//!   requires integer data and bounded integer coefficients.
//!
//! [`LossOracle`] wraps the configured strategy and cross-checks it against
//! [`DirectLoss`], falling back to it when they disagree.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1};

use crate::coefficients::{extreme_sum, CoefficientSet};
use crate::data::Dataset;
use crate::error::{Result, RiskSlimError};

pub mod cached;
pub mod direct;
pub mod lookup;

pub use cached::CachedLoss;
pub use direct::DirectLoss;
pub use lookup::LookupLoss;

/// Relative tolerance within which all strategies must agree.
pub const AGREEMENT_TOLERANCE: f64 = 1e-9;

/// Which strategy computes the loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LossComputation {
    /// Direct evaluation over all rows.
    #[default]
    Normal,
    /// Cached scores with incremental single-coordinate updates.
    Fast,
    /// Lookup table over integer scores.
    Lookup,
}

impl FromStr for LossComputation {
    type Err = RiskSlimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(LossComputation::Normal),
            "fast" => Ok(LossComputation::Fast),
            "lookup" => Ok(LossComputation::Lookup),
            other => Err(RiskSlimError::config(format!(
                "unknown loss_computation '{}' (expected normal, fast or lookup)",
                other
            ))),
        }
    }
}

impl fmt::Display for LossComputation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LossComputation::Normal => "normal",
            LossComputation::Fast => "fast",
            LossComputation::Lookup => "lookup",
        };
        f.write_str(name)
    }
}

/// A way of computing the logistic loss and its gradient.
pub trait LossStrategy {
    /// Scores `Z rho` of every row.
    fn scores(&self, rho: &[f64]) -> Array1<f64>;

    /// Loss of a score vector.
    fn loss_from_scores(&self, scores: ArrayView1<'_, f64>) -> f64;

    /// Loss of a coefficient vector.
    fn loss(&mut self, rho: &[f64]) -> f64 {
        let scores = self.scores(rho);
        self.loss_from_scores(scores.view())
    }

    /// Loss and gradient of a coefficient vector.
    fn loss_and_gradient(&mut self, rho: &[f64]) -> (f64, Vec<f64>);

    /// Loss of `rho` with coordinate `j` set to `value`.
    fn loss_with_coordinate(&mut self, rho: &[f64], j: usize, value: f64) -> f64 {
        let mut moved = rho.to_vec();
        moved[j] = value;
        self.loss(&moved)
    }

    /// Evaluations served by an O(n) single-coordinate update.
    fn incremental_updates(&self) -> usize {
        0
    }

    /// Which computation this is.
    fn kind(&self) -> LossComputation;
}

/// `log(1 + exp(-s))` without overflow.
#[inline]
pub fn logistic_loss(score: f64) -> f64 {
    if score > 0.0 {
        (-score).exp().ln_1p()
    } else {
        score.exp().ln_1p() - score
    }
}

/// `1 / (1 + exp(s))`, the derivative of [`logistic_loss`] up to sign.
#[inline]
pub fn logistic_weight(score: f64) -> f64 {
    if score >= 0.0 {
        let e = (-score).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + score.exp())
    }
}

/// Strategy-independent gradient from a score vector.
pub(crate) fn gradient_from_scores(data: &Dataset, scores: ArrayView1<'_, f64>) -> Vec<f64> {
    let n = data.n_samples() as f64;
    let factors: Array1<f64> = scores
        .iter()
        .zip(data.weights().iter())
        .map(|(&s, &w)| -w * logistic_weight(s) / n)
        .collect();
    data.z().t().dot(&factors).to_vec()
}

/// Warning raised when a strategy disagrees with direct evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericInstabilityWarning {
    /// Strategy that disagreed.
    pub strategy: LossComputation,
    /// Its loss value.
    pub value: f64,
    /// The direct loss value.
    pub reference: f64,
}

impl fmt::Display for NumericInstabilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} loss {:.12} disagrees with direct loss {:.12}; falling back to normal",
            self.strategy, self.value, self.reference
        )
    }
}

/// Loss evaluation entry point for the search.
pub struct LossOracle<'a> {
    data: &'a Dataset,
    active: Box<dyn LossStrategy + 'a>,
    warnings: Vec<NumericInstabilityWarning>,
    evaluations: usize,
}

impl<'a> LossOracle<'a> {
    /// Build the oracle with the requested strategy.
    pub fn new(
        data: &'a Dataset,
        coefficients: &CoefficientSet,
        computation: LossComputation,
    ) -> Result<Self> {
        let active: Box<dyn LossStrategy + 'a> = match computation {
            LossComputation::Normal => Box::new(DirectLoss::new(data)),
            LossComputation::Fast => Box::new(CachedLoss::new(data)),
            LossComputation::Lookup => Box::new(LookupLoss::new(data, coefficients)?),
        };
        Ok(Self {
            data,
            active,
            warnings: Vec::new(),
            evaluations: 0,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_strategy(data: &'a Dataset, active: Box<dyn LossStrategy + 'a>) -> Self {
        Self {
            data,
            active,
            warnings: Vec::new(),
            evaluations: 0,
        }
    }

    /// The strategy currently in use.
    pub fn active(&self) -> LossComputation {
        self.active.kind()
    }

    /// The data the oracle evaluates.
    pub fn data(&self) -> &'a Dataset {
        self.data
    }

    /// Number of loss evaluations so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Instability warnings recorded so far.
    pub fn warnings(&self) -> &[NumericInstabilityWarning] {
        &self.warnings
    }

    /// Evaluations the active strategy served incrementally.
    pub fn incremental_updates(&self) -> usize {
        self.active.incremental_updates()
    }

    /// Loss of a coefficient vector.
    pub fn loss(&mut self, rho: &[f64]) -> f64 {
        self.evaluations += 1;
        self.active.loss(rho)
    }

    /// Loss and gradient of a coefficient vector.
    pub fn loss_and_gradient(&mut self, rho: &[f64]) -> (f64, Vec<f64>) {
        self.evaluations += 1;
        self.active.loss_and_gradient(rho)
    }

    /// Loss of `rho` with coordinate `j` set to `value`.
    pub fn loss_with_coordinate(&mut self, rho: &[f64], j: usize, value: f64) -> f64 {
        self.evaluations += 1;
        self.active.loss_with_coordinate(rho, j, value)
    }

    /// Cross-check the active strategy against direct evaluation at `rho`.
    ///
    /// On disagreement beyond [`AGREEMENT_TOLERANCE`] a warning is recorded
    /// and the oracle switches to direct evaluation for good. Returns false
    /// if a fallback happened.
    pub fn verify(&mut self, rho: &[f64]) -> bool {
        if self.active.kind() == LossComputation::Normal {
            return true;
        }
        let value = self.active.loss(rho);
        let reference = DirectLoss::new(self.data).loss(rho);
        if approx::relative_eq!(
            value,
            reference,
            epsilon = f64::EPSILON,
            max_relative = AGREEMENT_TOLERANCE
        ) {
            return true;
        }
        let warning = NumericInstabilityWarning {
            strategy: self.active.kind(),
            value,
            reference,
        };
        log::warn!("numeric instability: {}", warning);
        self.warnings.push(warning);
        self.active = Box::new(DirectLoss::new(self.data));
        false
    }
}

impl fmt::Debug for LossOracle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LossOracle")
            .field("active", &self.active.kind())
            .field("evaluations", &self.evaluations)
            .field("warnings", &self.warnings)
            .finish()
    }
}

/// Bounds on the loss of any coefficient vector in the box with at most
/// `max_size` nonzero penalized coefficients.
pub fn loss_bounds(data: &Dataset, coefficients: &CoefficientSet, max_size: usize) -> (f64, f64) {
    let variables = coefficients.variables();
    let z = data.z();
    let n = data.n_samples() as f64;
    let mut loss_min = 0.0;
    let mut loss_max = 0.0;
    let mut reg_lo = Vec::with_capacity(variables.len());
    let mut reg_hi = Vec::with_capacity(variables.len());

    for (row, &w) in z.outer_iter().zip(data.weights().iter()) {
        reg_lo.clear();
        reg_hi.clear();
        let mut s_min = 0.0;
        let mut s_max = 0.0;
        for (var, &zij) in variables.iter().zip(row.iter()) {
            let a = zij * var.lb;
            let b = zij * var.ub;
            let (mut lo, mut hi) = (a.min(b), a.max(b));
            if var.c0 > 0.0 {
                if var.admits_zero() {
                    lo = lo.min(0.0);
                    hi = hi.max(0.0);
                }
                reg_lo.push(lo);
                reg_hi.push(hi);
            } else {
                s_min += lo;
                s_max += hi;
            }
        }
        s_min += extreme_sum(&mut reg_lo, max_size, false);
        s_max += extreme_sum(&mut reg_hi, max_size, true);
        loss_min += w * logistic_loss(s_max);
        loss_max += w * logistic_loss(s_min);
    }
    (loss_min / n, loss_max / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::VarType;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn integer_dataset(seed: u64, n: usize, p: usize) -> Dataset {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, p), |(_, j)| {
            if j == 0 {
                1.0
            } else {
                rng.gen_range(-2..=3) as f64
            }
        });
        let y = (0..n)
            .map(|_| if rng.gen_bool(0.4) { 1.0 } else { -1.0 })
            .collect();
        Dataset::new(x, y, None).unwrap()
    }

    #[test]
    fn test_logistic_loss_is_stable() {
        assert_relative_eq!(logistic_loss(0.0), 2f64.ln(), epsilon = 1e-15);
        assert_relative_eq!(logistic_loss(800.0), 0.0, epsilon = 1e-15);
        assert_relative_eq!(logistic_loss(-800.0), 800.0, epsilon = 1e-9);
        assert_relative_eq!(logistic_weight(0.0), 0.5, epsilon = 1e-15);
        assert!(logistic_weight(-800.0) > 0.999);
    }

    #[test]
    fn test_strategies_agree() {
        let data = integer_dataset(7, 60, 5);
        let coefs = CoefficientSet::new(
            CoefficientSet::generic_names(5),
            -5.0,
            5.0,
            0.01,
            VarType::Integer,
        )
        .unwrap();

        let mut direct = DirectLoss::new(&data);
        let mut cached = CachedLoss::new(&data);
        let mut lookup = LookupLoss::new(&data, &coefs).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut rho = vec![0.0; 5];
        for _ in 0..40 {
            let j = rng.gen_range(0..5);
            rho[j] = rng.gen_range(-5..=5) as f64;
            let reference = direct.loss(&rho);
            assert_relative_eq!(cached.loss(&rho), reference, max_relative = AGREEMENT_TOLERANCE);
            assert_relative_eq!(lookup.loss(&rho), reference, max_relative = AGREEMENT_TOLERANCE);

            let (_, g_direct) = direct.loss_and_gradient(&rho);
            let (_, g_cached) = cached.loss_and_gradient(&rho);
            for (a, b) in g_direct.iter().zip(&g_cached) {
                assert_relative_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let data = integer_dataset(3, 40, 4);
        let mut direct = DirectLoss::new(&data);
        let rho = vec![0.3, -0.2, 0.5, 0.1];
        let (_, grad) = direct.loss_and_gradient(&rho);
        let h = 1e-6;
        for j in 0..rho.len() {
            let mut up = rho.clone();
            let mut down = rho.clone();
            up[j] += h;
            down[j] -= h;
            let fd = (direct.loss(&up) - direct.loss(&down)) / (2.0 * h);
            assert_relative_eq!(grad[j], fd, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_oracle_falls_back_on_disagreement() {
        let data = integer_dataset(5, 20, 3);
        let coefs =
            CoefficientSet::new(CoefficientSet::generic_names(3), -3.0, 3.0, 0.01, VarType::Integer)
                .unwrap();
        let mut oracle = LossOracle::new(&data, &coefs, LossComputation::Fast).unwrap();
        assert!(oracle.verify(&[1.0, -1.0, 2.0]));
        assert_eq!(oracle.active(), LossComputation::Fast);

        // Poison the oracle with a strategy that is off by a constant.
        struct Skewed<'a>(DirectLoss<'a>);
        impl LossStrategy for Skewed<'_> {
            fn scores(&self, rho: &[f64]) -> Array1<f64> {
                self.0.scores(rho)
            }
            fn loss_from_scores(&self, scores: ArrayView1<'_, f64>) -> f64 {
                self.0.loss_from_scores(scores) + 1e-3
            }
            fn loss_and_gradient(&mut self, rho: &[f64]) -> (f64, Vec<f64>) {
                self.0.loss_and_gradient(rho)
            }
            fn kind(&self) -> LossComputation {
                LossComputation::Fast
            }
        }
        oracle.active = Box::new(Skewed(DirectLoss::new(&data)));
        assert!(!oracle.verify(&[1.0, -1.0, 2.0]));
        assert_eq!(oracle.active(), LossComputation::Normal);
        assert_eq!(oracle.warnings().len(), 1);
    }

    #[test]
    fn test_loss_bounds_bracket_losses() {
        let data = integer_dataset(9, 30, 4);
        let coefs =
            CoefficientSet::new(CoefficientSet::generic_names(4), -2.0, 2.0, 0.01, VarType::Integer)
                .unwrap();
        let (lo, hi) = loss_bounds(&data, &coefs, 2);
        let mut direct = DirectLoss::new(&data);
        for rho in [[0.0, 0.0, 0.0, 0.0], [2.0, -2.0, 1.0, 0.0], [-2.0, 0.0, 2.0, 2.0]] {
            let value = direct.loss(&rho);
            assert!(lo <= value + 1e-12 && value <= hi + 1e-12);
        }
    }

    #[test]
    fn test_parse_loss_computation() {
        assert_eq!("lookup".parse::<LossComputation>().unwrap(), LossComputation::Lookup);
        assert!("exact".parse::<LossComputation>().is_err());
        assert_eq!(LossComputation::Fast.to_string(), "fast");
    }
}
