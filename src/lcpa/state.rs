use std::time::{Duration, Instant};

use crate::bounds::Bounds;
use crate::heuristics::SolutionPool;
use crate::solution::{HeuristicStats, Solution, TerminationReason};

/// Where the search is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Program not yet loaded into the oracle.
    Init,
    /// Next step is a solver round.
    Solving,
    /// Next step runs rounding and polishing.
    Heuristic,
    /// Stopped.
    Terminated(TerminationReason),
}

/// Everything the search loop carries from one step to the next.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub phase: Phase,
    pub bounds: Bounds,
    pub incumbent: Option<Solution>,
    /// Solver rounds run so far.
    pub rounds: usize,
    /// Loss cuts added so far.
    pub cuts: usize,
    /// Branch-and-bound nodes over all rounds.
    pub nodes: usize,
    pub stats: HeuristicStats,
    pub pool: SolutionPool,
    /// Latest root relaxation not yet rounded, as `(coefficients, surrogate objective)`.
    pub relaxation: Option<(Vec<f64>, f64)>,
    pub started: Instant,
}

impl SearchState {
    pub fn new(bounds: Bounds, pool_size: usize) -> Self {
        Self {
            phase: Phase::Init,
            bounds,
            incumbent: None,
            rounds: 0,
            cuts: 0,
            nodes: 0,
            stats: HeuristicStats::default(),
            pool: SolutionPool::new(pool_size),
            relaxation: None,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Objective of the incumbent (`+inf` without one).
    pub fn best_objective(&self) -> f64 {
        self.incumbent
            .as_ref()
            .map_or(f64::INFINITY, |s| s.objective)
    }

    /// Offer a feasible solution. It enters the pool, and becomes the
    /// incumbent if it beats the current one. Returns true on a new incumbent.
    pub fn offer(&mut self, solution: Solution) -> bool {
        if !solution.feasible {
            return false;
        }
        let improves = solution.objective < self.best_objective();
        self.pool.add(solution.clone());
        if improves {
            self.bounds.record_objective(solution.objective);
            self.incumbent = Some(solution);
        }
        improves
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.phase, Phase::Terminated(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solution(rho: &[f64], objective: f64, feasible: bool) -> Solution {
        Solution {
            coefficients: rho.to_vec(),
            loss: objective,
            l0_norm: 0,
            objective,
            feasible,
        }
    }

    #[test]
    fn test_offer_tracks_incumbent_and_bounds() {
        let mut state = SearchState::new(Bounds::new(0, 2), 10);
        assert_eq!(state.phase, Phase::Init);
        assert!(state.best_objective().is_infinite());

        assert!(state.offer(solution(&[0.0, 1.0], 0.6, true)));
        assert!(!state.offer(solution(&[0.0, 2.0], 0.7, true)));
        assert!(!state.offer(solution(&[0.0, 3.0], 0.1, false)));
        assert!(state.offer(solution(&[1.0, 1.0], 0.5, true)));

        assert_eq!(state.bounds.objval_max, 0.5);
        assert_eq!(state.incumbent.as_ref().unwrap().coefficients, vec![1.0, 1.0]);
        assert_eq!(state.pool.len(), 3);
    }
}
