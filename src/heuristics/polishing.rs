use std::time::Instant;

use crate::coefficients::CoefficientSet;
use crate::loss::LossOracle;
use crate::solution::Solution;

/// Maximum number of committed moves per polishing call.
pub const MAX_POLISHING_STEPS: usize = 500;

/// Smallest objective decrease that counts as an improvement.
const MIN_IMPROVEMENT: f64 = 1e-8;

/// Discrete coordinate descent on an integer solution.
///
/// Each step scans every integer coordinate except the one changed last and
/// every integer value in its bounds, then commits the single best move if
/// it lowers the objective by at least `1e-8`. Moves that leave
/// `[min_size, max_size]` are never considered. The returned solution is
/// never worse than `solution`.
pub fn discrete_descent(
    solution: &Solution,
    coefficients: &CoefficientSet,
    oracle: &mut LossOracle<'_>,
    min_size: usize,
    max_size: usize,
    deadline: Option<Instant>,
) -> Solution {
    let variables = coefficients.variables();

    let mut rho = solution.coefficients.clone();
    let mut loss = oracle.loss(&rho);
    let mut penalty = coefficients.penalty(&rho);
    let mut size = coefficients.model_size(&rho);
    let mut last_changed = None;

    for step in 0..MAX_POLISHING_STEPS {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::debug!("polishing stopped at its deadline after {} steps", step);
            break;
        }
        let objective = loss + penalty;
        let mut best: Option<(f64, usize, f64, f64)> = None;

        for (j, var) in variables.iter().enumerate() {
            if !var.is_integer() || last_changed == Some(j) {
                continue;
            }
            if !var.lb.is_finite() || !var.ub.is_finite() {
                continue;
            }
            let current = rho[j];
            let penalized = var.c0 > 0.0;
            let mut value = var.lb;
            while value <= var.ub {
                if value != current {
                    let new_size = size - usize::from(penalized && current != 0.0)
                        + usize::from(penalized && value != 0.0);
                    if new_size >= min_size && new_size <= max_size {
                        let trial_loss = oracle.loss_with_coordinate(&rho, j, value);
                        let mut trial_penalty = penalty;
                        if current != 0.0 {
                            trial_penalty -= var.c0;
                        }
                        if value != 0.0 {
                            trial_penalty += var.c0;
                        }
                        let trial = trial_loss + trial_penalty;
                        if best.as_ref().map_or(true, |b| trial < b.0) {
                            best = Some((trial, j, value, trial_loss));
                        }
                    }
                }
                value += 1.0;
            }
        }

        match best {
            Some((trial, j, value, trial_loss))
                if trial <= objective - MIN_IMPROVEMENT =>
            {
                let penalized = variables[j].c0 > 0.0;
                size = size - usize::from(penalized && rho[j] != 0.0)
                    + usize::from(penalized && value != 0.0);
                rho[j] = value;
                loss = trial_loss;
                penalty = trial - trial_loss;
                last_changed = Some(j);
            }
            _ => break,
        }
    }

    let polished = Solution::evaluate(rho, loss, coefficients, min_size, max_size);
    if polished.objective <= solution.objective {
        polished
    } else {
        solution.clone()
    }
}
