//! Lattice cutting-plane search.
//!
//! The search minimizes `L(rho) + sum_j c0_j 1[rho_j != 0]` over the integer
//! lattice by alternating solver rounds on a surrogate program, whose loss
//! is a growing set of linear cuts, with rounding and polishing heuristics.
//! The search moves through the phases of [`SearchState`]:
//!
//! ```text
//! Init -> Solving -> Heuristic -> Solving -> ... -> Terminated
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use ndarray::array;
//! use riskslim::{optimize, BranchAndBoundOracle, CancelToken, CoefficientSet, Dataset, Settings};
//!
//! let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 1.0], [1.0, 0.0]];
//! let y = array![-1.0, 1.0, 1.0, -1.0];
//! let data = Dataset::new(x, y, None).unwrap();
//! let coefficients = CoefficientSet::with_defaults(CoefficientSet::generic_names(2)).unwrap();
//!
//! let mut oracle = BranchAndBoundOracle::default();
//! let info = optimize(
//!     &data,
//!     &coefficients,
//!     (0, None),
//!     &Settings::default(),
//!     &mut oracle,
//!     &CancelToken::new(),
//! )
//! .unwrap();
//! println!("{}", info);
//! ```

pub mod initialization;
pub mod state;

pub use initialization::{initialize, Initialization};
pub use state::{Phase, SearchState};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bounds::Bounds;
use crate::coefficients::CoefficientSet;
use crate::data::Dataset;
use crate::error::{Result, RiskSlimError};
use crate::heuristics::{cutoff, discrete_descent, sequential_rounding};
use crate::loss::{loss_bounds, LossOracle};
use crate::mip::{build_formulation, loss_cut, CutSource, MipIndices, MipProgram};
use crate::oracle::{MipOracle, RoundOutcome, RoundParams, RoundStatus};
use crate::settings::Settings;
use crate::solution::{Solution, SolutionInfo, TerminationReason};

/// Cooperative cancellation flag shared with other threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the search to stop at the next iteration boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation for every clone of the token.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Instant `seconds` after `start`; `None` when the budget is unlimited.
pub(crate) fn deadline_after(start: Instant, seconds: f64) -> Option<Instant> {
    if !seconds.is_finite() {
        return None;
    }
    Duration::try_from_secs_f64(seconds.max(0.0))
        .ok()
        .and_then(|d| start.checked_add(d))
}

/// Resolve the model-size interval for a coefficient set.
///
/// `max_size` defaults to, and is clamped to, the number of penalized
/// coefficients.
pub fn model_size_bounds(
    coefficients: &CoefficientSet,
    min_size: usize,
    max_size: Option<usize>,
) -> Result<(usize, usize)> {
    let trivial = coefficients.trivial_max_size();
    let max_size = max_size.map_or(trivial, |m| m.min(trivial));
    if min_size > max_size {
        return Err(RiskSlimError::config(format!(
            "min_size {} exceeds max_size {} (at most {} coefficients are penalized)",
            min_size, max_size, trivial
        )));
    }
    Ok((min_size, max_size))
}

/// Fit a risk score with the lattice cutting-plane search.
///
/// `size` is `(min_size, max_size)`, the allowed number of nonzero penalized
/// coefficients. The search stops when the incumbent is proven optimal, on
/// `max_runtime`, on `max_iterations` rounds, or when `cancel` fires, and
/// always returns the best incumbent found.
pub fn optimize<O: MipOracle + ?Sized>(
    data: &Dataset,
    coefficients: &CoefficientSet,
    size: (usize, Option<usize>),
    settings: &Settings,
    oracle: &mut O,
    cancel: &CancelToken,
) -> Result<SolutionInfo> {
    settings.validate()?;
    if coefficients.len() != data.n_columns() {
        return Err(RiskSlimError::config(format!(
            "coefficient set has {} variables but the data has {} columns",
            coefficients.len(),
            data.n_columns()
        )));
    }
    let (min_size, max_size) = model_size_bounds(coefficients, size.0, size.1)?;

    let data = data.clone().with_class_weights(settings.w_pos, settings.w_neg);
    let loss = LossOracle::new(&data, coefficients, settings.loss_computation)?;
    let (loss_min, loss_max) = loss_bounds(&data, coefficients, max_size);
    let bounds = Bounds::new(min_size, max_size).with_loss_bounds(loss_min, loss_max);
    let (program, indices) = build_formulation(coefficients, &bounds);

    log::info!(
        "searching {} coefficients with {} ({} variables, size in [{}, {}])",
        coefficients.len(),
        oracle.name(),
        indices.n_variables,
        min_size,
        max_size
    );

    let mut search = Search {
        coefficients,
        settings,
        oracle,
        loss,
        program,
        indices,
        c0_nonzero: coefficients.c0_nonzero(),
        cancel,
    };
    let mut state = SearchState::new(bounds, settings.solution_pool_size);
    let reason = loop {
        state = match state.phase {
            Phase::Init => search.init(state)?,
            Phase::Solving => search.solve(state)?,
            Phase::Heuristic => search.heuristics(state),
            Phase::Terminated(reason) => break reason,
        };
    };
    search.finish(state, reason)
}

/// Immutable inputs and the collaborators of one search.
struct Search<'a, 'o, O: MipOracle + ?Sized> {
    coefficients: &'a CoefficientSet,
    settings: &'a Settings,
    oracle: &'o mut O,
    loss: LossOracle<'a>,
    program: MipProgram,
    indices: MipIndices,
    c0_nonzero: Vec<f64>,
    cancel: &'a CancelToken,
}

impl<O: MipOracle + ?Sized> Search<'_, '_, O> {
    fn size(&self, state: &SearchState) -> (usize, usize) {
        (state.bounds.min_size, state.bounds.max_size)
    }

    fn init(&mut self, mut state: SearchState) -> Result<SearchState> {
        self.oracle
            .load(&self.program)
            .map_err(|e| e.with_bounds(&state.bounds))?;

        let zero = vec![0.0; self.coefficients.len()];
        let (value, gradient) = self.loss.loss_and_gradient(&zero);
        self.oracle
            .add_cut(&loss_cut(&self.indices, &zero, value, &gradient, CutSource::Seed));
        state.cuts += 1;

        let (min_size, max_size) = self.size(&state);
        let trivial = Solution::evaluate(zero, value, self.coefficients, min_size, max_size);
        if state.offer(trivial) {
            log::debug!("trivial model seeds the incumbent at {:.9}", value);
        }

        if self.settings.initialization_flag {
            let init = initialize(
                &self.program,
                &self.indices,
                self.coefficients,
                &mut self.loss,
                (min_size, max_size),
                self.settings,
            );
            self.oracle.add_cuts(&init.cuts);
            state.cuts += init.cuts.len();
            state.bounds.record_lower_bound(init.lower_bound);
            state.stats.rounding_calls += init.rounding_calls;
            state.stats.rounding_successes += init.solutions.len();
            state.stats.polishing_calls += init.polishing_calls;
            for solution in init.solutions {
                if state.offer(solution) {
                    state.stats.heuristic_incumbents += 1;
                }
            }
            log::info!(
                "initialization: {} cuts, bounds {}",
                init.cuts.len(),
                state.bounds
            );
        }

        self.incumbent_changed(&mut state);
        self.update_bounds(&mut state);
        state.phase = Phase::Solving;
        Ok(state)
    }

    fn limit_reached(&self, state: &SearchState) -> Option<TerminationReason> {
        if self.cancel.is_cancelled() {
            return Some(TerminationReason::Cancelled);
        }
        if state.elapsed().as_secs_f64() >= self.settings.max_runtime {
            return Some(TerminationReason::TimeLimit);
        }
        if self
            .settings
            .max_iterations
            .is_some_and(|limit| state.rounds >= limit)
        {
            return Some(TerminationReason::IterationLimit);
        }
        if state.incumbent.is_some() && state.bounds.gap() <= self.settings.max_tolerance {
            return Some(TerminationReason::Optimal);
        }
        None
    }

    fn round_params(&self, state: &SearchState) -> RoundParams {
        let remaining = self.settings.max_runtime - state.elapsed().as_secs_f64();
        RoundParams {
            time_limit: if remaining.is_finite() {
                Duration::try_from_secs_f64(remaining.max(0.0)).ok()
            } else {
                None
            },
            node_limit: self.settings.solver_node_limit,
            seed: self.settings.solver_randomseed,
            emphasis: self.settings.solver_mipemphasis,
            display_progress: self.settings.display_solver_progress,
        }
    }

    fn solve(&mut self, mut state: SearchState) -> Result<SearchState> {
        if let Some(reason) = self.limit_reached(&state) {
            state.phase = Phase::Terminated(reason);
            return Ok(state);
        }

        let params = self.round_params(&state);
        let outcome = self
            .oracle
            .solve_round(&params)
            .map_err(|e| e.with_bounds(&state.bounds))?;
        state.rounds += 1;
        state.nodes += outcome.nodes;
        log::debug!(
            "round {}: {} in {} nodes, bound {:.9}, {} new solutions",
            state.rounds,
            outcome.status,
            outcome.nodes,
            outcome.best_bound,
            outcome.solutions.len()
        );

        if outcome.status == RoundStatus::Infeasible {
            if state.incumbent.is_none() {
                return Err(RiskSlimError::InfeasibleProblem {
                    message: "no coefficient vector satisfies the bounds".to_string(),
                    bounds: state.bounds.clone(),
                });
            }
            // Nothing beats the incumbent.
            let best = state.bounds.objval_max;
            state.bounds.record_lower_bound(best);
            state.phase = Phase::Terminated(TerminationReason::Optimal);
            return Ok(state);
        }

        if let Some(x) = &outcome.relaxation {
            state.relaxation = Some((self.indices.coefficients(x), x[self.indices.objval]));
        }

        let source = CutSource::SolverSolution {
            round: state.rounds,
        };
        for x in &outcome.solutions {
            self.evaluate_solver_point(&mut state, x, source);
        }
        let exact = self.is_exact(&state, &outcome);
        // Cuts may have invalidated the oracle's copy of the incumbent.
        self.incumbent_changed(&mut state);
        if outcome.best_bound.is_finite() {
            state.bounds.record_lower_bound(outcome.best_bound);
        }
        self.update_bounds(&mut state);

        if outcome.status == RoundStatus::Optimal && exact {
            // The surrogate matches the loss at its optimum.
            let best = state.bounds.objval_max;
            state.bounds.record_lower_bound(best);
            state.phase = Phase::Terminated(TerminationReason::Optimal);
            return Ok(state);
        }

        state.phase = if self.settings.round_flag || self.settings.polish_flag {
            Phase::Heuristic
        } else {
            Phase::Solving
        };
        Ok(state)
    }

    /// Evaluate an integer point returned by the oracle, adding a loss cut if
    /// the surrogate underestimates it. Returns true on a new incumbent.
    fn evaluate_solver_point(&mut self, state: &mut SearchState, x: &[f64], source: CutSource) -> bool {
        let rho = self.solver_coefficients(x);
        let (value, gradient) = self.loss.loss_and_gradient(&rho);
        if value - x[self.indices.loss] > self.settings.cut_tolerance {
            self.oracle
                .add_cut(&loss_cut(&self.indices, &rho, value, &gradient, source));
            state.cuts += 1;
        }
        let (min_size, max_size) = self.size(state);
        let solution = Solution::evaluate(rho, value, self.coefficients, min_size, max_size);
        self.accept(state, solution)
    }

    /// Coefficients of a solver point, integer coordinates snapped.
    fn solver_coefficients(&self, x: &[f64]) -> Vec<f64> {
        self.indices
            .coefficients(x)
            .into_iter()
            .zip(self.coefficients.variables())
            .map(|(r, v)| if v.is_integer() { r.round() } else { r })
            .collect()
    }

    /// Whether the oracle's incumbent after a round is the search incumbent
    /// or carries its true loss. Either way the surrogate optimum is tight.
    fn is_exact(&mut self, state: &SearchState, outcome: &RoundOutcome) -> bool {
        let Some(x) = &outcome.incumbent else {
            return false;
        };
        let rho = self.solver_coefficients(x);
        if state
            .incumbent
            .as_ref()
            .is_some_and(|s| s.coefficients == rho)
        {
            return true;
        }
        let value = self.loss.loss(&rho);
        value - x[self.indices.loss] <= self.settings.cut_tolerance
    }

    /// Offer a solution. A would-be incumbent is first cross-checked against
    /// the direct loss and restated if the active strategy falls back, so
    /// the pool and `objval_max` only ever see verified objectives.
    fn accept(&mut self, state: &mut SearchState, mut solution: Solution) -> bool {
        if solution.feasible
            && solution.objective < state.best_objective()
            && !self.loss.verify(&solution.coefficients)
        {
            let value = self.loss.loss(&solution.coefficients);
            let (min_size, max_size) = self.size(state);
            solution =
                Solution::evaluate(solution.coefficients, value, self.coefficients, min_size, max_size);
        }
        let objective = solution.objective;
        if !state.offer(solution) {
            return false;
        }
        log::info!(
            "new incumbent {:.9} (size {}) at {:.2}s, gap {:.6}",
            objective,
            state.incumbent.as_ref().map_or(0, |s| s.l0_norm),
            state.elapsed().as_secs_f64(),
            state.bounds.gap()
        );
        true
    }

    /// Hand the incumbent and the objective cut to the oracle.
    fn incumbent_changed(&mut self, state: &mut SearchState) {
        let Some(incumbent) = &state.incumbent else {
            return;
        };
        let x = self
            .indices
            .lift(self.coefficients, &incumbent.coefficients, incumbent.loss);
        let objective = incumbent.objective;
        self.update_bounds(state);
        self.oracle.set_incumbent(&x, objective);
    }

    /// Run chained updates and push the envelope onto the program variables.
    fn update_bounds(&mut self, state: &mut SearchState) {
        if self.settings.chained_updates_flag {
            state.bounds.chained_update(&self.c0_nonzero);
        }
        let b = &state.bounds;
        let indices = &self.indices;
        self.oracle
            .set_variable_bounds(indices.loss, b.loss_min, b.loss_max);
        self.oracle
            .set_variable_bounds(indices.objval, b.objval_min, b.objval_max);
        self.oracle
            .set_variable_bounds(indices.l0, b.min_size as f64, b.max_size as f64);
    }

    fn heuristics(&mut self, mut state: SearchState) -> SearchState {
        let settings = self.settings;
        let gap = state.bounds.gap();
        let mut improved = false;

        if settings.round_flag && settings.rounding_schedule.is_active(state.cuts, gap) {
            if let Some((rho, surrogate)) = state.relaxation.take() {
                let rounding_cutoff = cutoff(state.best_objective(), settings.rounding_tolerance);
                if surrogate < rounding_cutoff {
                    improved |= self.round_and_polish(&mut state, &rho, rounding_cutoff);
                }
            }
        }

        if settings.polish_flag && settings.polishing_schedule.is_active(state.cuts, gap) {
            improved |= self.polish_pool(&mut state);
        }

        if improved {
            self.incumbent_changed(&mut state);
            if state.bounds.gap() <= settings.max_tolerance {
                state.phase = Phase::Terminated(TerminationReason::Optimal);
                return state;
            }
        }
        state.phase = Phase::Solving;
        state
    }

    fn round_and_polish(&mut self, state: &mut SearchState, rho: &[f64], rounding_cutoff: f64) -> bool {
        let (min_size, max_size) = self.size(state);
        state.stats.rounding_calls += 1;
        let Some(mut solution) = sequential_rounding(
            rho,
            self.coefficients,
            &mut self.loss,
            min_size,
            max_size,
            rounding_cutoff,
            None,
        ) else {
            return false;
        };
        state.stats.rounding_successes += 1;

        if self.settings.polish_rounded_solutions {
            state.stats.polishing_calls += 1;
            let deadline = deadline_after(Instant::now(), self.settings.polishing_max_runtime);
            solution = discrete_descent(
                &solution,
                self.coefficients,
                &mut self.loss,
                min_size,
                max_size,
                deadline,
            );
        }
        self.accept_heuristic(state, solution)
    }

    fn polish_pool(&mut self, state: &mut SearchState) -> bool {
        let threshold = cutoff(state.best_objective(), self.settings.polishing_tolerance);
        let candidates = state
            .pool
            .take_unpolished(threshold, self.settings.polishing_max_solutions);
        if candidates.is_empty() {
            return false;
        }
        let deadline = deadline_after(Instant::now(), self.settings.polishing_max_runtime);
        let (min_size, max_size) = self.size(state);
        let mut improved = false;
        for candidate in candidates {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            state.stats.polishing_calls += 1;
            let polished = discrete_descent(
                &candidate,
                self.coefficients,
                &mut self.loss,
                min_size,
                max_size,
                deadline,
            );
            if self.accept_heuristic(state, polished) {
                state.stats.polishing_successes += 1;
                improved = true;
            }
        }
        improved
    }

    fn accept_heuristic(&mut self, state: &mut SearchState, solution: Solution) -> bool {
        let rho = solution.coefficients.clone();
        if !self.accept(state, solution) {
            return false;
        }
        state.stats.heuristic_incumbents += 1;
        if self.settings.add_cuts_at_heuristic_solutions {
            let (value, gradient) = self.loss.loss_and_gradient(&rho);
            self.oracle
                .add_cut(&loss_cut(&self.indices, &rho, value, &gradient, CutSource::Heuristic));
            state.cuts += 1;
        }
        true
    }

    fn finish(self, state: SearchState, reason: TerminationReason) -> Result<SolutionInfo> {
        let Some(incumbent) = state.incumbent.clone() else {
            return Err(RiskSlimError::solver(format!(
                "search stopped ({}) before finding a feasible solution",
                reason
            ))
            .with_bounds(&state.bounds));
        };
        let gap = state.bounds.gap();
        log::info!(
            "search finished ({}): objective {:.9}, gap {:.6}, {} rounds, {} cuts, {:.2}s",
            reason,
            incumbent.objective,
            gap,
            state.rounds,
            state.cuts,
            state.elapsed().as_secs_f64()
        );
        Ok(SolutionInfo {
            coefficients: incumbent.coefficients,
            loss: incumbent.loss,
            objval: incumbent.objective,
            l0_norm: incumbent.l0_norm,
            termination: reason,
            optimality_gap: gap,
            lower_bound: state.bounds.objval_min,
            upper_bound: state.bounds.objval_max,
            elapsed: state.elapsed(),
            rounds: state.rounds,
            cuts: state.cuts,
            nodes: state.nodes,
            heuristics: state.stats,
            warnings: self.loss.warnings().to_vec(),
            pool: state.pool.to_vec(),
            bounds: state.bounds,
        })
    }
}
