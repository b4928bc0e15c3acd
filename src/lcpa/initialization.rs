//! Cutting-plane pass over the continuous relaxation.
//!
//! Solves the surrogate with every integrality requirement dropped, adding a
//! loss cut at each relaxation optimum, until the relaxation gap closes or a
//! limit is hit. The cuts and the final lower bound seed the main search;
//! rounding and polishing the best relaxation points give a first incumbent.

use std::time::Instant;

use crate::coefficients::CoefficientSet;
use crate::heuristics::{discrete_descent, sequential_rounding};
use crate::lcpa::deadline_after;
use crate::loss::LossOracle;
use crate::lp::{minimize, LpStatus, Sense, SimplexConfig};
use crate::mip::{loss_cut, CutSource, LinearCut, MipIndices, MipProgram};
use crate::settings::Settings;
use crate::solution::Solution;

/// What the initialization pass hands to the main search.
#[derive(Debug, Clone, Default)]
pub struct Initialization {
    /// Loss cuts generated along the way.
    pub cuts: Vec<LinearCut>,
    /// Lower bound from the last relaxation solved (`-inf` if none was).
    pub lower_bound: f64,
    /// Integer solutions from rounding and polishing, best first.
    pub solutions: Vec<Solution>,
    /// Relaxations solved.
    pub iterations: usize,
    pub rounding_calls: usize,
    pub polishing_calls: usize,
}

/// Run the continuous cutting-plane pass on `program`.
pub fn initialize(
    program: &MipProgram,
    indices: &MipIndices,
    coefficients: &CoefficientSet,
    loss: &mut LossOracle<'_>,
    size: (usize, usize),
    settings: &Settings,
) -> Initialization {
    let start = Instant::now();
    let deadline = deadline_after(start, settings.init_max_runtime);
    let cut_tolerance = settings.cut_tolerance;
    let mut lp = program.relaxation(&program.lower(), &program.upper());

    let mut output = Initialization {
        lower_bound: f64::NEG_INFINITY,
        ..Initialization::default()
    };
    // Relaxation points with their objective under the true loss.
    let mut candidates: Vec<(f64, Vec<f64>)> = Vec::new();
    let mut upper_bound = f64::INFINITY;

    while output.iterations < settings.init_max_iterations {
        let now = Instant::now();
        if deadline.is_some_and(|d| now >= d) {
            break;
        }
        let per_iteration = deadline_after(now, settings.init_max_runtime_per_iteration);
        let config = SimplexConfig {
            deadline: match (deadline, per_iteration) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
            ..SimplexConfig::default()
        };
        let result = minimize(&lp, &config);
        output.iterations += 1;
        if settings.init_display_solver_progress {
            log::info!(
                "init LP {:>4}: {:?} after {} pivots, objective {:.9}",
                output.iterations,
                result.status,
                result.iterations,
                result.objective
            );
        }
        if result.status != LpStatus::Optimal {
            log::debug!("initialization relaxation stopped: {:?}", result.status);
            break;
        }

        let x = result.x;
        let rho = indices.coefficients(&x);
        let (value, gradient) = loss.loss_and_gradient(&rho);
        output.lower_bound = output.lower_bound.max(result.objective);
        let relaxed_objective = value + x[indices.objval] - x[indices.loss];
        upper_bound = upper_bound.min(relaxed_objective);
        candidates.push((relaxed_objective, rho.clone()));

        let gap = if upper_bound > 0.0 {
            (upper_bound - output.lower_bound) / upper_bound
        } else {
            0.0
        };
        if settings.init_display_progress {
            log::info!(
                "init {:>4}: lower {:.9} upper {:.9} gap {:.6}",
                output.iterations,
                output.lower_bound,
                upper_bound,
                gap
            );
        }
        if value - x[indices.loss] <= cut_tolerance || gap <= settings.init_max_tolerance {
            break;
        }
        let cut = loss_cut(indices, &rho, value, &gradient, CutSource::Initialization);
        lp.add_constraint(cut.coefs.clone(), Sense::Le, cut.rhs);
        output.cuts.push(cut);
    }
    log::debug!(
        "initialization: {} relaxations, {} cuts, lower bound {:.9}",
        output.iterations,
        output.cuts.len(),
        output.lower_bound
    );

    if !settings.init_use_sequential_rounding {
        return output;
    }
    let (min_size, max_size) = size;
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
    let rounding_deadline = deadline_after(Instant::now(), settings.init_sequential_rounding_max_runtime);
    let mut rounded = Vec::new();
    for (_, rho) in candidates
        .iter()
        .take(settings.init_sequential_rounding_max_solutions)
    {
        output.rounding_calls += 1;
        if let Some(solution) = sequential_rounding(
            rho,
            coefficients,
            loss,
            min_size,
            max_size,
            f64::INFINITY,
            rounding_deadline,
        ) {
            if !rounded.iter().any(|s: &Solution| s.coefficients == solution.coefficients) {
                rounded.push(solution);
            }
        }
    }
    rounded.sort_by(|a, b| a.objective.total_cmp(&b.objective));

    if settings.init_polishing_after {
        let polishing_deadline = deadline_after(Instant::now(), settings.init_polishing_max_runtime);
        for solution in rounded.iter_mut().take(settings.init_polishing_max_solutions) {
            output.polishing_calls += 1;
            *solution = discrete_descent(
                solution,
                coefficients,
                loss,
                min_size,
                max_size,
                polishing_deadline,
            );
        }
        rounded.sort_by(|a, b| a.objective.total_cmp(&b.objective));
    }
    output.solutions = rounded;
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;
    use crate::data::Dataset;
    use crate::loss::{loss_bounds, LossComputation};
    use crate::mip::build_formulation;
    use ndarray::array;

    #[test]
    fn test_initialization_produces_cuts_bound_and_incumbent() {
        let x = array![
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, 0.0, 0.0],
        ];
        let y = array![1.0, -1.0, 1.0, -1.0, 1.0, -1.0, -1.0, 1.0];
        let data = Dataset::new(x, y, None).unwrap();
        let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(3)).unwrap();
        let (loss_min, loss_max) = loss_bounds(&data, &coefs, 2);
        let bounds = Bounds::new(0, 2).with_loss_bounds(loss_min, loss_max);
        let (program, indices) = build_formulation(&coefs, &bounds);
        let mut loss = LossOracle::new(&data, &coefs, LossComputation::Normal).unwrap();

        let settings = Settings::default().with_initialization(true);
        let init = initialize(&program, &indices, &coefs, &mut loss, (0, 2), &settings);

        assert!(init.iterations > 0);
        assert!(!init.cuts.is_empty());
        assert!(init.lower_bound.is_finite());
        let best = &init.solutions[0];
        assert!(best.feasible);
        // The relaxation bound never exceeds a feasible objective.
        assert!(init.lower_bound <= best.objective + 1e-9);
        assert!(init
            .solutions
            .windows(2)
            .all(|w| w[0].objective <= w[1].objective));
    }
}
