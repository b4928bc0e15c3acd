use std::time::Instant;

use crate::coefficients::CoefficientSet;
use crate::loss::LossOracle;
use crate::solution::Solution;

/// Distance from an integer below which a coordinate counts as integral.
const INTEGRALITY_TOLERANCE: f64 = 1e-6;

/// Round a fractional coefficient vector one coordinate at a time.
///
/// At every step each remaining fractional integer coordinate is tried at
/// its ceiling and its floor; the single move with the smallest objective is
/// committed (ties go to the lowest index, ceiling first). Moves that would
/// force the final model above `max_size` are skipped. Returns `None` when
/// no admissible move exists, the deadline passes, the result violates the
/// size bounds, or its objective is not below `objective_cutoff`.
pub fn sequential_rounding(
    rho: &[f64],
    coefficients: &CoefficientSet,
    oracle: &mut LossOracle<'_>,
    min_size: usize,
    max_size: usize,
    objective_cutoff: f64,
    deadline: Option<Instant>,
) -> Option<Solution> {
    let variables = coefficients.variables();

    let mut rho: Vec<f64> = rho
        .iter()
        .zip(variables)
        .map(|(&r, v)| r.clamp(v.lb, v.ub))
        .collect();
    let mut fractional = Vec::new();
    for (j, var) in variables.iter().enumerate() {
        if !var.is_integer() {
            continue;
        }
        let nearest = rho[j].round();
        if (rho[j] - nearest).abs() <= INTEGRALITY_TOLERANCE {
            rho[j] = nearest;
        } else {
            fractional.push(j);
        }
    }

    let choices = |j: usize, value: f64| -> [f64; 2] {
        let var = &variables[j];
        [value.ceil().min(var.ub), value.floor().max(var.lb)]
    };
    let penalized = |j: usize| variables[j].c0 > 0.0;
    // Fractional coordinates whose floor and ceiling are both nonzero.
    let forced = |j: usize, value: f64| -> bool {
        penalized(j) && choices(j, value).iter().all(|&v| v != 0.0)
    };

    let mut penalty = coefficients.penalty(&rho);
    let mut loss = oracle.loss(&rho);

    while !fractional.is_empty() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::debug!("sequential rounding stopped at its deadline");
            return None;
        }
        let committed = (0..rho.len())
            .filter(|&k| penalized(k) && rho[k] != 0.0 && !fractional.contains(&k))
            .count();
        let forced_total = fractional.iter().filter(|&&k| forced(k, rho[k])).count();

        let mut best: Option<(f64, usize, f64, f64)> = None;
        for (pos, &j) in fractional.iter().enumerate() {
            let current = rho[j];
            let forced_others = forced_total - usize::from(forced(j, current));
            for value in choices(j, current) {
                let nonzero = usize::from(penalized(j) && value != 0.0);
                if committed + forced_others + nonzero > max_size {
                    continue;
                }
                let trial_loss = oracle.loss_with_coordinate(&rho, j, value);
                let mut trial_penalty = penalty;
                if current != 0.0 {
                    trial_penalty -= variables[j].c0;
                }
                if value != 0.0 {
                    trial_penalty += variables[j].c0;
                }
                let objective = trial_loss + trial_penalty;
                if best.as_ref().map_or(true, |b| objective < b.0) {
                    best = Some((objective, pos, value, trial_loss));
                }
            }
        }

        let (objective, pos, value, trial_loss) = best?;
        let j = fractional.remove(pos);
        rho[j] = value;
        loss = trial_loss;
        penalty = objective - trial_loss;
    }

    let solution = Solution::evaluate(rho, loss, coefficients, min_size, max_size);
    (solution.feasible && solution.objective < objective_cutoff).then_some(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;
    use crate::loss::LossComputation;
    use ndarray::array;

    fn dataset() -> Dataset {
        let x = array![
            [1.0, 1.0, 0.0, 1.0],
            [1.0, 0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 0.0],
            [1.0, 0.0, 0.0, 1.0],
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 0.0, 1.0, 0.0],
        ];
        let y = array![1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        Dataset::new(x, y, None).unwrap()
    }

    fn coefficients() -> CoefficientSet {
        CoefficientSet::with_defaults(CoefficientSet::generic_names(4)).unwrap()
    }

    #[test]
    fn test_rounds_to_integers_within_bounds() {
        let data = dataset();
        let coefs = coefficients();
        let mut oracle = LossOracle::new(&data, &coefs, LossComputation::Normal).unwrap();

        let solution = sequential_rounding(
            &[-0.4, 1.7, -1.2, 0.3],
            &coefs,
            &mut oracle,
            0,
            3,
            f64::INFINITY,
            None,
        )
        .unwrap();
        assert!(solution.feasible);
        for (r, var) in solution.coefficients.iter().zip(coefs.variables()) {
            assert_eq!(r.fract(), 0.0);
            assert!(*r >= var.lb && *r <= var.ub);
        }
        assert!(solution.l0_norm <= 3);
    }

    #[test]
    fn test_respects_max_size() {
        let data = dataset();
        let coefs = coefficients();
        let mut oracle = LossOracle::new(&data, &coefs, LossComputation::Normal).unwrap();

        let solution = sequential_rounding(
            &[0.2, 0.6, -0.3, 0.9],
            &coefs,
            &mut oracle,
            0,
            0,
            f64::INFINITY,
            None,
        )
        .unwrap();
        assert_eq!(solution.l0_norm, 0);
        assert_eq!(&solution.coefficients[1..], &[0.0, 0.0, 0.0]);

        // Two coordinates can no longer reach zero: nothing admissible.
        let none = sequential_rounding(
            &[0.0, 1.5, -1.5, 0.0],
            &coefs,
            &mut oracle,
            0,
            1,
            f64::INFINITY,
            None,
        );
        assert!(none.is_none());
    }

    #[test]
    fn test_cutoff_rejects_worse_solutions() {
        let data = dataset();
        let coefs = coefficients();
        let mut oracle = LossOracle::new(&data, &coefs, LossComputation::Normal).unwrap();

        let result = sequential_rounding(&[0.0, 1.4, -1.4, 0.0], &coefs, &mut oracle, 0, 3, 0.1, None);
        assert!(result.is_none());
    }

    #[test]
    fn test_integral_input_passes_through() {
        let data = dataset();
        let coefs = coefficients();
        let mut oracle = LossOracle::new(&data, &coefs, LossComputation::Normal).unwrap();

        let solution =
            sequential_rounding(&[0.0, 2.0, -2.0, 0.0], &coefs, &mut oracle, 0, 3, f64::INFINITY, None)
                .unwrap();
        assert_eq!(solution.coefficients, vec![0.0, 2.0, -2.0, 0.0]);
        assert_eq!(solution.l0_norm, 2);
    }

    #[test]
    fn test_fast_loss_rounds_incrementally() {
        let data = dataset();
        let coefs = coefficients();
        let start = [-0.4, 1.7, -1.2, 0.3];
        let mut normal = LossOracle::new(&data, &coefs, LossComputation::Normal).unwrap();
        let mut fast = LossOracle::new(&data, &coefs, LossComputation::Fast).unwrap();

        let expected =
            sequential_rounding(&start, &coefs, &mut normal, 0, 3, f64::INFINITY, None).unwrap();
        let solution =
            sequential_rounding(&start, &coefs, &mut fast, 0, 3, f64::INFINITY, None).unwrap();
        assert!(solution.coefficients.iter().all(|r| r.fract() == 0.0));
        assert!((solution.objective - expected.objective).abs() < 1e-9);
        assert!(fast.incremental_updates() > 0);
        assert_eq!(normal.incremental_updates(), 0);
    }
}
