//! Live optimization envelope for the cutting-plane search.
//!
//! [`Bounds`] tracks the model-size interval, the best objective found so far
//! (`objval_max`), the best proven lower bound (`objval_min`) and the loss
//! interval implied by them. Every mutator is monotone: intervals only narrow.

use std::fmt;

/// Maximum number of passes of the chained-update fixed point.
const MAX_CHAIN_COUNT: usize = 20;

/// Slack used when converting objective budgets into integer model sizes.
const SIZE_ROUNDING_SLACK: f64 = 1e-6;

/// Envelope of the optimization problem at some point of the search.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    /// Minimum number of nonzero penalized coefficients.
    pub min_size: usize,
    /// Maximum number of nonzero penalized coefficients.
    pub max_size: usize,
    /// Best proven lower bound on the objective.
    pub objval_min: f64,
    /// Objective of the best feasible solution found (the incumbent).
    pub objval_max: f64,
    /// Lower bound on the loss of any improving solution.
    pub loss_min: f64,
    /// Upper bound on the loss of any improving solution.
    pub loss_max: f64,
}

impl Bounds {
    /// Fresh envelope with the given size interval and no objective information.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            objval_min: 0.0,
            objval_max: f64::INFINITY,
            loss_min: 0.0,
            loss_max: f64::INFINITY,
        }
    }

    /// Set the initial loss interval (usually derived from score bounds).
    pub fn with_loss_bounds(mut self, loss_min: f64, loss_max: f64) -> Self {
        self.loss_min = self.loss_min.max(loss_min);
        self.loss_max = self.loss_max.min(loss_max);
        self
    }

    /// Relative optimality gap `(objval_max - objval_min) / objval_max`.
    ///
    /// Infinite until an incumbent exists; zero once the bounds have met.
    pub fn gap(&self) -> f64 {
        if !self.objval_max.is_finite() {
            return f64::INFINITY;
        }
        if self.objval_max <= self.objval_min {
            return 0.0;
        }
        if self.objval_max <= 0.0 {
            return f64::INFINITY;
        }
        (self.objval_max - self.objval_min) / self.objval_max
    }

    /// Narrow the size interval. Returns true if anything changed.
    pub fn tighten_size(&mut self, min_size: usize, max_size: usize) -> bool {
        let mut changed = false;
        if min_size > self.min_size {
            self.min_size = min_size;
            changed = true;
        }
        if max_size < self.max_size {
            self.max_size = max_size;
            changed = true;
        }
        changed
    }

    /// Record a proven lower bound. Returns true if it improved `objval_min`.
    pub fn record_lower_bound(&mut self, value: f64) -> bool {
        if value.is_finite() && value > self.objval_min {
            self.objval_min = value;
            true
        } else {
            false
        }
    }

    /// Record the objective of a feasible solution. Returns true if it improved `objval_max`.
    pub fn record_objective(&mut self, value: f64) -> bool {
        if value.is_finite() && value < self.objval_max {
            self.objval_max = value;
            true
        } else {
            false
        }
    }

    /// Propagate the relations between objective, loss and model size.
    ///
    /// `c0_nonzero` holds the L0 penalties of the penalized variables. The
    /// relations used are
    /// `objval = loss + penalty` and `C0_min * L0 <= penalty <= C0_max * L0`.
    /// Returns true if any bound moved.
    pub fn chained_update(&mut self, c0_nonzero: &[f64]) -> bool {
        let before = self.clone();

        if self.objval_max <= self.objval_min {
            self.objval_min = self.objval_min.min(self.objval_max);
            self.loss_max = self.loss_max.min(self.objval_max);
            return *self != before;
        }

        let c0_min = c0_nonzero.iter().cloned().fold(f64::INFINITY, f64::min);
        let c0_max = c0_nonzero.iter().cloned().fold(0.0_f64, f64::max);
        let penalized = c0_min.is_finite() && c0_min > 0.0;

        for _ in 0..MAX_CHAIN_COUNT {
            let mut improved = false;
            let (reg_min, reg_max) = if penalized {
                (c0_min * self.min_size as f64, c0_max * self.max_size as f64)
            } else {
                (0.0, 0.0)
            };

            // loss_min from objval_min
            let proposed = self.objval_min - reg_max;
            if proposed > self.loss_min {
                self.loss_min = proposed;
                improved = true;
            }

            // L0_min from objval_min
            if penalized && self.loss_max.is_finite() && self.objval_min > self.loss_max {
                let proposed = ((self.objval_min - self.loss_max) / c0_min - SIZE_ROUNDING_SLACK)
                    .ceil()
                    .max(0.0) as usize;
                if proposed > self.min_size && proposed <= self.max_size {
                    self.min_size = proposed;
                    improved = true;
                }
            }

            // objval_min from loss_min
            let proposed = self.loss_min + reg_min;
            if proposed > self.objval_min && proposed <= self.objval_max {
                self.objval_min = proposed;
                improved = true;
            }

            // loss_max from objval_max
            if self.objval_max.is_finite() {
                let proposed = self.objval_max - reg_min;
                if proposed < self.loss_max {
                    self.loss_max = proposed;
                    improved = true;
                }
            }

            // L0_max from objval_max
            if penalized && self.objval_max.is_finite() && self.objval_max > self.loss_min {
                let proposed = ((self.objval_max - self.loss_min) / c0_min + SIZE_ROUNDING_SLACK)
                    .floor()
                    .max(0.0);
                if proposed < self.max_size as f64 && proposed >= self.min_size as f64 {
                    self.max_size = proposed as usize;
                    improved = true;
                }
            }

            // objval_max from loss_max
            let proposed = self.loss_max + reg_max;
            if proposed < self.objval_max {
                self.objval_max = proposed;
                improved = true;
            }

            if !improved {
                break;
            }
        }

        *self != before
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size=[{}, {}] objval=[{:.6}, {:.6}] loss=[{:.6}, {:.6}] gap={:.4}",
            self.min_size,
            self.max_size,
            self.objval_min,
            self.objval_max,
            self.loss_min,
            self.loss_max,
            self.gap()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gap_lifecycle() {
        let mut bounds = Bounds::new(0, 4);
        assert!(bounds.gap().is_infinite());

        assert!(bounds.record_objective(0.5));
        assert!(bounds.record_lower_bound(0.25));
        assert_relative_eq!(bounds.gap(), 0.5, epsilon = 1e-12);

        // Worse values are ignored.
        assert!(!bounds.record_objective(0.7));
        assert!(!bounds.record_lower_bound(0.1));
        assert_relative_eq!(bounds.gap(), 0.5, epsilon = 1e-12);

        bounds.record_lower_bound(0.5);
        assert_eq!(bounds.gap(), 0.0);
    }

    #[test]
    fn test_size_only_narrows() {
        let mut bounds = Bounds::new(1, 5);
        assert!(!bounds.tighten_size(0, 7));
        assert_eq!((bounds.min_size, bounds.max_size), (1, 5));
        assert!(bounds.tighten_size(2, 3));
        assert_eq!((bounds.min_size, bounds.max_size), (2, 3));
    }

    #[test]
    fn test_chained_update_shrinks_max_size() {
        // Incumbent objective 0.40, loss can't drop below 0.30, each nonzero costs 0.04,
        // so at most floor(0.10 / 0.04) = 2 nonzeros can pay off.
        let mut bounds = Bounds::new(0, 6).with_loss_bounds(0.30, 0.69);
        bounds.record_objective(0.40);
        assert!(bounds.chained_update(&[0.04, 0.04, 0.05]));
        assert_eq!(bounds.max_size, 2);
        assert!(bounds.loss_max <= 0.40);
    }

    #[test]
    fn test_chained_update_is_monotone() {
        let mut bounds = Bounds::new(0, 10).with_loss_bounds(0.1, 0.8);
        bounds.record_objective(0.6);
        bounds.record_lower_bound(0.2);
        let before = bounds.clone();
        bounds.chained_update(&[0.01; 10]);

        assert!(bounds.min_size >= before.min_size);
        assert!(bounds.max_size <= before.max_size);
        assert!(bounds.objval_min >= before.objval_min);
        assert!(bounds.objval_max <= before.objval_max);
        assert!(bounds.loss_min >= before.loss_min);
        assert!(bounds.loss_max <= before.loss_max);
        assert!(bounds.min_size <= bounds.max_size);
    }

    #[test]
    fn test_chained_update_without_penalties() {
        let mut bounds = Bounds::new(0, 3).with_loss_bounds(0.0, 1.0);
        bounds.record_objective(0.5);
        bounds.chained_update(&[]);
        assert_eq!(bounds.max_size, 3);
        assert_relative_eq!(bounds.loss_max, 0.5, epsilon = 1e-12);
    }
}
