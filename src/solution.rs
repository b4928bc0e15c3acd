//! Solutions and the run summary returned by the search.

use std::fmt;
use std::time::Duration;

use crate::bounds::Bounds;
use crate::coefficients::CoefficientSet;
use crate::loss::NumericInstabilityWarning;

/// A candidate coefficient vector with its true loss and objective.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub coefficients: Vec<f64>,
    pub loss: f64,
    /// Number of nonzero penalized coefficients.
    pub l0_norm: usize,
    /// `loss + sum c0_j * 1[rho_j != 0]`.
    pub objective: f64,
    /// Integral where required, inside the box and within the size bounds.
    pub feasible: bool,
}

impl Solution {
    /// Evaluate a coefficient vector whose loss is already known.
    pub fn evaluate(
        coefficients: Vec<f64>,
        loss: f64,
        set: &CoefficientSet,
        min_size: usize,
        max_size: usize,
    ) -> Self {
        let l0_norm = set.model_size(&coefficients);
        let objective = loss + set.penalty(&coefficients);
        let in_box = set.variables().iter().zip(&coefficients).all(|(v, &r)| {
            r >= v.lb && r <= v.ub && (!v.is_integer() || r.fract() == 0.0)
        });
        let feasible = in_box && l0_norm >= min_size && l0_norm <= max_size;
        Self {
            coefficients,
            loss,
            l0_norm,
            objective,
            feasible,
        }
    }
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The incumbent is optimal within `max_tolerance`.
    Optimal,
    /// `max_runtime` elapsed.
    TimeLimit,
    /// The cancel token was triggered.
    Cancelled,
    /// `max_iterations` solver rounds were run.
    IterationLimit,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationReason::Optimal => "optimal",
            TerminationReason::TimeLimit => "time limit",
            TerminationReason::Cancelled => "cancelled",
            TerminationReason::IterationLimit => "iteration limit",
        };
        f.write_str(name)
    }
}

/// Counters for the rounding and polishing heuristics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeuristicStats {
    pub rounding_calls: usize,
    /// Rounding calls that returned a solution.
    pub rounding_successes: usize,
    pub polishing_calls: usize,
    /// Polishing calls that improved the incumbent.
    pub polishing_successes: usize,
    /// Incumbent updates that came from a heuristic rather than the solver.
    pub heuristic_incumbents: usize,
}

/// Summary of a finished search.
#[derive(Debug, Clone)]
pub struct SolutionInfo {
    /// Best coefficients found, intercept first.
    pub coefficients: Vec<f64>,
    pub loss: f64,
    /// Objective value of `coefficients`.
    pub objval: f64,
    pub l0_norm: usize,
    pub termination: TerminationReason,
    /// Relative optimality gap at termination.
    pub optimality_gap: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub elapsed: Duration,
    /// Solver rounds run.
    pub rounds: usize,
    /// Loss cuts added, seed and initialization cuts included.
    pub cuts: usize,
    /// Branch-and-bound nodes over all rounds.
    pub nodes: usize,
    pub heuristics: HeuristicStats,
    pub warnings: Vec<NumericInstabilityWarning>,
    /// Feasible solutions kept in the pool, best first.
    pub pool: Vec<Solution>,
    pub bounds: Bounds,
}

impl fmt::Display for SolutionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "termination:   {}", self.termination)?;
        writeln!(f, "objective:     {:.9}", self.objval)?;
        writeln!(f, "loss:          {:.9}", self.loss)?;
        writeln!(f, "model size:    {}", self.l0_norm)?;
        writeln!(f, "gap:           {:.6}", self.optimality_gap)?;
        writeln!(f, "rounds/cuts:   {}/{}", self.rounds, self.cuts)?;
        write!(f, "elapsed:       {:.3}s", self.elapsed.as_secs_f64())
    }
}
