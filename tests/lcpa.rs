use approx::assert_relative_eq;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use riskslim::settings::SettingValue;
use riskslim::{
    build_formulation, model_size_bounds, optimize, Bounds, BranchAndBoundOracle, CancelToken,
    CoefficientSet, Dataset, LossComputation, LossOracle, RiskSlimError, Settings, SolutionInfo,
    TerminationReason, VarType,
};

/// Two binary features that both raise the odds of a positive label.
fn synthetic(n: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).unwrap();
    let mut x = Array2::zeros((n, 3));
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let a = f64::from(u8::from(rng.gen_bool(0.5)));
        let b = f64::from(u8::from(rng.gen_bool(0.4)));
        x[[i, 0]] = 1.0;
        x[[i, 1]] = a;
        x[[i, 2]] = b;
        let latent = -1.0 + 2.0 * a + 1.5 * b + noise.sample(&mut rng);
        y[i] = if latent > 0.0 { 1.0 } else { -1.0 };
    }
    Dataset::new(x, y, None).unwrap()
}

fn settings() -> Settings {
    Settings::default().with_max_runtime(60.0).with_seed(3)
}

fn run(data: &Dataset, coefs: &CoefficientSet, size: (usize, Option<usize>), settings: &Settings) -> SolutionInfo {
    let mut oracle = BranchAndBoundOracle::default();
    optimize(data, coefs, size, settings, &mut oracle, &CancelToken::new()).unwrap()
}

/// Smallest objective over every lattice point of a three-column set.
fn exhaustive_minimum(data: &Dataset, coefs: &CoefficientSet, max_size: usize) -> f64 {
    let mut loss = LossOracle::new(data, coefs, LossComputation::Normal).unwrap();
    let vars = coefs.variables();
    let range = |j: usize| (vars[j].lb as i64)..=(vars[j].ub as i64);
    let mut best = f64::INFINITY;
    for r0 in range(0) {
        for r1 in range(1) {
            for r2 in range(2) {
                let rho = [r0 as f64, r1 as f64, r2 as f64];
                if coefs.model_size(&rho) > max_size {
                    continue;
                }
                best = best.min(loss.loss(&rho) + coefs.penalty(&rho));
            }
        }
    }
    best
}

#[test]
fn test_ten_columns_give_22_program_variables() {
    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(10)).unwrap();
    let (program, indices) = build_formulation(&coefs, &Bounds::new(0, 9));
    assert_eq!(indices.n_variables, 22);
    assert_eq!(program.num_vars(), 22);
}

#[test]
fn test_search_reaches_lattice_optimum() {
    let data = synthetic(80, 11);
    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(3)).unwrap();
    let info = run(&data, &coefs, (0, None), &settings());

    assert_eq!(info.termination, TerminationReason::Optimal);
    assert_relative_eq!(info.objval, exhaustive_minimum(&data, &coefs, 2), max_relative = 1e-7);
    assert!(info.lower_bound <= info.objval + 1e-9);
    assert!(info.rounds >= 1);
    assert!(info.cuts >= 1);
    assert!(info.coefficients.iter().all(|r| r.fract() == 0.0));
    assert!(info.pool.iter().all(|s| s.objective >= info.objval - 1e-12));
}

#[test]
fn test_initialization_and_lookup_loss_reach_same_optimum() {
    let data = synthetic(80, 11);
    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(3)).unwrap();
    let plain = run(&data, &coefs, (0, None), &settings());
    let tuned = run(
        &data,
        &coefs,
        (0, None),
        &settings()
            .with_initialization(true)
            .with_loss_computation(LossComputation::Lookup),
    );
    assert_eq!(tuned.termination, TerminationReason::Optimal);
    assert_relative_eq!(plain.objval, tuned.objval, max_relative = 1e-7);
    assert!(tuned.warnings.is_empty());
}

#[test]
fn test_zero_max_size_keeps_only_intercept() {
    let data = synthetic(60, 5);
    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(3)).unwrap();
    let info = run(&data, &coefs, (0, Some(0)), &settings());
    assert_eq!(info.l0_norm, 0);
    assert!(info.coefficients[1..].iter().all(|&r| r == 0.0));
}

#[test]
fn test_max_size_is_clamped_to_penalized_columns() {
    let data = synthetic(60, 5);
    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(3)).unwrap();
    assert_eq!(model_size_bounds(&coefs, 0, Some(50)).unwrap(), (0, 2));
    assert_eq!(
        model_size_bounds(&coefs, 0, Some(50)).unwrap(),
        model_size_bounds(&coefs, 0, None).unwrap()
    );

    let info = run(&data, &coefs, (0, Some(50)), &settings());
    assert!(info.bounds.max_size <= 2);
    assert!(info.l0_norm <= 2);
}

#[test]
fn test_single_feature_budget() {
    let data = synthetic(80, 21);
    let coefs = CoefficientSet::new(CoefficientSet::generic_names(3), -5.0, 5.0, 1e-6, VarType::Integer)
        .unwrap();
    let info = run(&data, &coefs, (0, Some(1)), &settings());
    let nonzero = info.coefficients[1..].iter().filter(|&&r| r != 0.0).count();
    assert!(nonzero <= 1);
    assert!(info.l0_norm <= 1);
}

#[test]
fn test_same_seed_gives_identical_coefficients() {
    let data = synthetic(60, 8);
    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(3)).unwrap();
    let mut settings = settings().with_initialization(true);
    settings.max_iterations = Some(15);
    settings.solver_node_limit = Some(200);

    let first = run(&data, &coefs, (0, None), &settings);
    let second = run(&data, &coefs, (0, None), &settings);
    assert_eq!(first.coefficients, second.coefficients);
    assert_eq!(first.objval.to_bits(), second.objval.to_bits());
    assert_eq!(first.rounds, second.rounds);
}

#[test]
fn test_cancelled_search_returns_incumbent() {
    let data = synthetic(40, 2);
    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(3)).unwrap();
    let token = CancelToken::new();
    token.cancel();
    let mut oracle = BranchAndBoundOracle::default();
    let info = optimize(&data, &coefs, (0, None), &settings(), &mut oracle, &token).unwrap();

    assert_eq!(info.termination, TerminationReason::Cancelled);
    assert_eq!(info.rounds, 0);
    assert_eq!(info.coefficients, vec![0.0; 3]);
}

#[test]
fn test_time_and_iteration_limits() {
    let data = synthetic(40, 2);
    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(3)).unwrap();

    let info = run(&data, &coefs, (0, None), &settings().with_max_runtime(0.0));
    assert_eq!(info.termination, TerminationReason::TimeLimit);
    assert_eq!(info.rounds, 0);

    let mut limited = settings();
    limited.max_iterations = Some(1);
    let info = run(&data, &coefs, (0, None), &limited);
    assert!(info.rounds <= 1);
    assert!(matches!(
        info.termination,
        TerminationReason::IterationLimit | TerminationReason::Optimal
    ));
}

#[test]
fn test_infeasible_size_bounds() {
    let data = synthetic(40, 3);
    // Both features must be nonzero, but at most one may be.
    let coefs = CoefficientSet::new(
        CoefficientSet::generic_names(3),
        vec![-5.0, 1.0, 1.0],
        vec![5.0, 3.0, 3.0],
        1e-6,
        VarType::Integer,
    )
    .unwrap();
    let mut oracle = BranchAndBoundOracle::default();
    let err = optimize(&data, &coefs, (0, Some(1)), &settings(), &mut oracle, &CancelToken::new())
        .unwrap_err();
    match err {
        RiskSlimError::InfeasibleProblem { bounds, .. } => assert_eq!(bounds.max_size, 1),
        other => panic!("expected an infeasible problem, got {}", other),
    }
}

#[test]
fn test_configuration_errors_precede_search() {
    let data = synthetic(40, 3);
    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(4)).unwrap();
    let mut oracle = BranchAndBoundOracle::default();
    let err = optimize(&data, &coefs, (0, None), &settings(), &mut oracle, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, RiskSlimError::Configuration(_)));

    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(3)).unwrap();
    let err = optimize(&data, &coefs, (3, Some(2)), &settings(), &mut oracle, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, RiskSlimError::Configuration(_)));
}

#[test]
fn test_settings_map_is_checked() {
    let ok = Settings::from_pairs([
        ("max_runtime", SettingValue::Float(5.0)),
        ("round_flag", SettingValue::Bool(false)),
        ("loss_computation", SettingValue::Text("fast".to_string())),
    ])
    .unwrap();
    assert_eq!(ok.max_runtime, 5.0);
    assert!(!ok.round_flag);
    assert_eq!(ok.loss_computation, LossComputation::Fast);

    let unknown = Settings::from_pairs([("cplex_threads", SettingValue::Int(1))]);
    assert!(matches!(unknown, Err(RiskSlimError::Configuration(_))));
    let mistyped = Settings::from_pairs([("round_flag", SettingValue::Float(1.0))]);
    assert!(matches!(mistyped, Err(RiskSlimError::Configuration(_))));
}
