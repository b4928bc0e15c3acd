//! Solver oracle contract.
//!
//! The cutting-plane search talks to its MIP solver only through
//! [`MipOracle`]: load a program, add cuts, move variable bounds, inject an
//! incumbent and run one bounded solve round. [`BranchAndBoundOracle`] is the
//! built-in backend.

pub mod branch_and_bound;

pub use branch_and_bound::BranchAndBoundOracle;

use std::fmt;
use std::time::Duration;

use crate::error::{Result, RiskSlimError};
use crate::mip::{LinearCut, MipProgram};

/// Node selection preference of a solve round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchEmphasis {
    /// Best-bound node selection (code 0).
    #[default]
    Balanced,
    /// Depth-first node selection, finds feasible solutions early (code 1).
    Feasibility,
}

impl SearchEmphasis {
    /// Parse the numeric emphasis code used in settings.
    pub fn from_code(code: usize) -> Result<Self> {
        match code {
            0 => Ok(SearchEmphasis::Balanced),
            1 => Ok(SearchEmphasis::Feasibility),
            other => Err(RiskSlimError::config(format!(
                "solver_mipemphasis must be 0 or 1, got {}",
                other
            ))),
        }
    }

    pub fn code(self) -> usize {
        match self {
            SearchEmphasis::Balanced => 0,
            SearchEmphasis::Feasibility => 1,
        }
    }
}

/// Limits and controls for one solve round.
#[derive(Debug, Clone)]
pub struct RoundParams {
    pub time_limit: Option<Duration>,
    pub node_limit: Option<usize>,
    pub seed: u64,
    pub emphasis: SearchEmphasis,
    pub display_progress: bool,
}

impl Default for RoundParams {
    fn default() -> Self {
        Self {
            time_limit: None,
            node_limit: None,
            seed: 0,
            emphasis: SearchEmphasis::Balanced,
            display_progress: false,
        }
    }
}

/// How a solve round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    /// The returned incumbent is optimal for the current program.
    Optimal,
    /// A limit was hit; the incumbent is feasible and the bound is valid.
    Feasible,
    /// The current program has no feasible point.
    Infeasible,
    /// A limit was hit before any feasible point was found.
    NoSolution,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundStatus::Optimal => "optimal",
            RoundStatus::Feasible => "feasible",
            RoundStatus::Infeasible => "infeasible",
            RoundStatus::NoSolution => "no solution",
        };
        f.write_str(name)
    }
}

/// Result of [`MipOracle::solve_round`].
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub status: RoundStatus,
    /// Best integer point known to the oracle at the end of the round.
    pub incumbent: Option<Vec<f64>>,
    /// Program objective of `incumbent` (`+inf` when there is none).
    pub incumbent_objective: f64,
    /// Integer points that improved the incumbent during this round, in discovery order.
    pub solutions: Vec<Vec<f64>>,
    /// Valid lower bound on the program objective.
    pub best_bound: f64,
    /// Solution of the root relaxation, if it was solved.
    pub relaxation: Option<Vec<f64>>,
    /// Nodes processed in this round.
    pub nodes: usize,
}

/// A MIP solver driven round by round.
pub trait MipOracle {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Replace the current program, dropping cuts and incumbent.
    fn load(&mut self, program: &MipProgram) -> Result<()>;

    /// Add a cut `coefs^T x <= rhs` to the program.
    fn add_cut(&mut self, cut: &LinearCut);

    /// Add several cuts.
    fn add_cuts(&mut self, cuts: &[LinearCut]) {
        for cut in cuts {
            self.add_cut(cut);
        }
    }

    /// Update the bounds of one variable.
    fn set_variable_bounds(&mut self, var: usize, lb: f64, ub: f64);

    /// Offer a feasible point. Ignored if infeasible or not better than the current incumbent.
    fn set_incumbent(&mut self, values: &[f64], objective: f64);

    /// Run one solve round under the given limits.
    fn solve_round(&mut self, params: &RoundParams) -> Result<RoundOutcome>;

    /// Number of cuts added since the last load.
    fn num_cuts(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emphasis_codes() {
        assert_eq!(SearchEmphasis::from_code(0).unwrap(), SearchEmphasis::Balanced);
        assert_eq!(SearchEmphasis::from_code(1).unwrap(), SearchEmphasis::Feasibility);
        assert!(SearchEmphasis::from_code(2).is_err());
        assert_eq!(SearchEmphasis::Feasibility.code(), 1);
    }
}
