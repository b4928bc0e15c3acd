//! Primal heuristics run between solver rounds.
//!
//! [`sequential_rounding`] turns a fractional relaxation point into an
//! integer solution; [`discrete_descent`] polishes an integer solution one
//! coordinate at a time; [`SolutionPool`] holds candidates for polishing.

pub mod polishing;
pub mod pool;
pub mod rounding;

pub use polishing::{discrete_descent, MAX_POLISHING_STEPS};
pub use pool::SolutionPool;
pub use rounding::sequential_rounding;

/// Objective threshold `(1 + tolerance) * best` used to gate heuristic work.
///
/// Infinite while no incumbent exists. Always computed from the current best
/// objective, so repeated calls never compound the tolerance.
pub fn cutoff(best_objective: f64, tolerance: f64) -> f64 {
    if best_objective.is_finite() && tolerance.is_finite() {
        best_objective + tolerance * best_objective.abs()
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cutoff_does_not_compound() {
        assert!(cutoff(f64::INFINITY, 0.1).is_infinite());
        let once = cutoff(0.5, 0.1);
        assert_relative_eq!(once, 0.55, epsilon = 1e-12);
        // Applied to the same best objective, the threshold is unchanged.
        assert_relative_eq!(cutoff(0.5, 0.1), once);
        assert!(cutoff(0.5, f64::INFINITY).is_infinite());
    }
}
