use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, RiskSlimError};
use crate::lp::{minimize, LpSolution, LpStatus, SimplexConfig};
use crate::mip::{LinearCut, MipProgram};
use crate::oracle::{MipOracle, RoundOutcome, RoundParams, RoundStatus, SearchEmphasis};

/// Open subproblem: bound overrides plus the relaxation value of its parent.
#[derive(Debug, Clone)]
struct Node {
    lower: Vec<f64>,
    upper: Vec<f64>,
    bound: f64,
    depth: usize,
    seq: usize,
}

/// Heap entry ordering nodes by smallest bound first, then creation order.
struct BestBound(Node);

impl PartialEq for BestBound {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BestBound {}

impl PartialOrd for BestBound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BestBound {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .bound
            .total_cmp(&self.0.bound)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

/// Open node storage for either selection rule.
enum NodeQueue {
    BestFirst(BinaryHeap<BestBound>),
    DepthFirst(Vec<Node>),
}

impl NodeQueue {
    fn new(emphasis: SearchEmphasis) -> Self {
        match emphasis {
            SearchEmphasis::Balanced => NodeQueue::BestFirst(BinaryHeap::new()),
            SearchEmphasis::Feasibility => NodeQueue::DepthFirst(Vec::new()),
        }
    }

    fn push(&mut self, node: Node) {
        match self {
            NodeQueue::BestFirst(heap) => heap.push(BestBound(node)),
            NodeQueue::DepthFirst(stack) => stack.push(node),
        }
    }

    fn pop(&mut self) -> Option<Node> {
        match self {
            NodeQueue::BestFirst(heap) => heap.pop().map(|entry| entry.0),
            NodeQueue::DepthFirst(stack) => stack.pop(),
        }
    }

    fn min_bound(&self) -> f64 {
        let bounds: Box<dyn Iterator<Item = f64> + '_> = match self {
            NodeQueue::BestFirst(heap) => Box::new(heap.iter().map(|entry| entry.0.bound)),
            NodeQueue::DepthFirst(stack) => Box::new(stack.iter().map(|node| node.bound)),
        };
        bounds.fold(f64::INFINITY, f64::min)
    }

    fn is_empty(&self) -> bool {
        match self {
            NodeQueue::BestFirst(heap) => heap.is_empty(),
            NodeQueue::DepthFirst(stack) => stack.is_empty(),
        }
    }
}

/// LP-based branch-and-bound over the bounded-variable simplex.
///
/// Nodes are selected best-bound first or depth first depending on
/// [`SearchEmphasis`]. Branching picks the most fractional integer variable,
/// breaking ties with a generator seeded from [`RoundParams::seed`], so
/// identical rounds explore identical trees.
#[derive(Debug, Clone)]
pub struct BranchAndBoundOracle {
    program: MipProgram,
    incumbent: Option<Vec<f64>>,
    incumbent_objective: f64,
    n_cuts: usize,
    tolerance: f64,
    max_lp_iterations: usize,
}

impl Default for BranchAndBoundOracle {
    fn default() -> Self {
        Self::new(1e-6)
    }
}

impl BranchAndBoundOracle {
    /// Oracle with the given integrality and feasibility tolerance.
    pub fn new(tolerance: f64) -> Self {
        Self {
            program: MipProgram::new(),
            incumbent: None,
            incumbent_objective: f64::INFINITY,
            n_cuts: 0,
            tolerance,
            max_lp_iterations: 50_000,
        }
    }

    /// The program as currently loaded, cuts included.
    pub fn program(&self) -> &MipProgram {
        &self.program
    }

    fn is_integer(&self, value: f64) -> bool {
        (value - value.round()).abs() < self.tolerance
    }

    fn solve_relaxation(&self, lower: &[f64], upper: &[f64], deadline: Option<Instant>) -> LpSolution {
        let lp = self.program.relaxation(lower, upper);
        let config = SimplexConfig {
            max_iterations: self.max_lp_iterations,
            deadline,
            ..SimplexConfig::default()
        };
        minimize(&lp, &config)
    }

    /// Most fractional integer variable, ties broken by the round generator.
    fn select_branch(&self, x: &[f64], rng: &mut ChaCha8Rng) -> Option<usize> {
        let mut best = 0.0;
        let mut candidates = Vec::new();
        for j in self.program.integer_indices() {
            if self.is_integer(x[j]) {
                continue;
            }
            let frac = x[j] - x[j].floor();
            let score = frac.min(1.0 - frac);
            if score > best + 1e-9 {
                best = score;
                candidates.clear();
                candidates.push(j);
            } else if (score - best).abs() <= 1e-9 {
                candidates.push(j);
            }
        }
        match candidates.len() {
            0 => None,
            1 => Some(candidates[0]),
            n => Some(candidates[rng.gen_range(0..n)]),
        }
    }

    fn branch(&self, node: &Node, var: usize, value: f64, bound: f64, seq: &mut usize) -> (Node, Node) {
        let mut down = node.clone();
        down.upper[var] = value.floor();
        down.bound = bound;
        down.depth += 1;
        down.seq = *seq;
        *seq += 1;

        let mut up = node.clone();
        up.lower[var] = value.ceil();
        up.bound = bound;
        up.depth += 1;
        up.seq = *seq;
        *seq += 1;

        (down, up)
    }

    /// Snap integer coordinates of an integral relaxation point.
    fn integral_point(&self, x: &[f64]) -> Vec<f64> {
        let mut point = x.to_vec();
        for j in self.program.integer_indices() {
            point[j] = point[j].round();
        }
        point
    }

    fn prune_threshold(&self) -> f64 {
        if self.incumbent_objective.is_finite() {
            self.incumbent_objective - 1e-9 * self.incumbent_objective.abs().max(1.0)
        } else {
            f64::INFINITY
        }
    }

    fn check_incumbent(&mut self) {
        if let Some(x) = &self.incumbent {
            if !self.program.is_feasible(x, self.tolerance) {
                log::debug!("dropping incumbent invalidated by a program change");
                self.incumbent = None;
                self.incumbent_objective = f64::INFINITY;
            }
        }
    }
}

impl MipOracle for BranchAndBoundOracle {
    fn name(&self) -> &str {
        "branch-and-bound"
    }

    fn load(&mut self, program: &MipProgram) -> Result<()> {
        for (j, var) in program.variables().iter().enumerate() {
            if var.lb.is_nan() || var.ub.is_nan() {
                return Err(RiskSlimError::config(format!(
                    "variable {} ({}) has NaN bounds",
                    j, var.name
                )));
            }
        }
        self.program = program.clone();
        self.incumbent = None;
        self.incumbent_objective = f64::INFINITY;
        self.n_cuts = 0;
        Ok(())
    }

    fn add_cut(&mut self, cut: &LinearCut) {
        self.program.add_cut(cut);
        self.n_cuts += 1;
        self.check_incumbent();
    }

    fn set_variable_bounds(&mut self, var: usize, lb: f64, ub: f64) {
        self.program.set_bounds(var, lb, ub);
        self.check_incumbent();
    }

    fn set_incumbent(&mut self, values: &[f64], objective: f64) {
        if objective >= self.incumbent_objective {
            return;
        }
        if !self.program.is_feasible(values, self.tolerance) {
            log::debug!("rejected infeasible incumbent with objective {:.6}", objective);
            return;
        }
        self.incumbent = Some(values.to_vec());
        self.incumbent_objective = objective;
    }

    fn solve_round(&mut self, params: &RoundParams) -> Result<RoundOutcome> {
        let start = Instant::now();
        let deadline = params.time_limit.map(|limit| start + limit);
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        let mut queue = NodeQueue::new(params.emphasis);
        let mut seq = 0;
        queue.push(Node {
            lower: self.program.lower(),
            upper: self.program.upper(),
            bound: f64::NEG_INFINITY,
            depth: 0,
            seq,
        });
        seq += 1;

        let mut solutions = Vec::new();
        let mut relaxation = None;
        let mut nodes = 0;
        let mut limit_hit = false;
        // Bound of a node that was popped but could not be finished.
        let mut unfinished_bound = f64::INFINITY;

        while let Some(node) = queue.pop() {
            if node.bound >= self.prune_threshold() {
                continue;
            }
            let out_of_time = deadline.is_some_and(|d| Instant::now() >= d);
            let out_of_nodes = params.node_limit.is_some_and(|limit| nodes >= limit);
            if out_of_time || out_of_nodes {
                unfinished_bound = node.bound;
                limit_hit = true;
                break;
            }
            nodes += 1;

            let result = self.solve_relaxation(&node.lower, &node.upper, deadline);
            match result.status {
                LpStatus::Optimal => {}
                LpStatus::Infeasible => continue,
                LpStatus::IterationLimit => {
                    unfinished_bound = node.bound;
                    limit_hit = true;
                    break;
                }
                LpStatus::Unbounded => {
                    return Err(RiskSlimError::solver("relaxation is unbounded"));
                }
            }
            if node.depth == 0 {
                relaxation = Some(result.x.clone());
            }
            if result.objective >= self.prune_threshold() {
                continue;
            }

            match self.select_branch(&result.x, &mut rng) {
                None => {
                    let point = self.integral_point(&result.x);
                    let objective = self.program.objective_value(&point);
                    if objective < self.incumbent_objective {
                        if params.display_progress {
                            log::info!(
                                "node {:>6} depth {:>3}: new incumbent {:.9}",
                                nodes,
                                node.depth,
                                objective
                            );
                        }
                        self.incumbent = Some(point.clone());
                        self.incumbent_objective = objective;
                        solutions.push(point);
                    }
                }
                Some(var) => {
                    let value = result.x[var];
                    let (down, up) = self.branch(&node, var, value, result.objective, &mut seq);
                    // Depth-first explores the down branch first.
                    queue.push(up);
                    queue.push(down);
                }
            }

            if params.display_progress && nodes % 1000 == 0 {
                log::info!(
                    "node {:>6}: incumbent {:.9}, open bound {:.9}",
                    nodes,
                    self.incumbent_objective,
                    queue.min_bound()
                );
            }
        }

        let exhausted = !limit_hit && queue.is_empty();
        let best_bound = if exhausted {
            self.incumbent_objective
        } else {
            queue
                .min_bound()
                .min(unfinished_bound)
                .min(self.incumbent_objective)
        };
        let status = match (exhausted, self.incumbent.is_some()) {
            (true, true) => RoundStatus::Optimal,
            (true, false) => RoundStatus::Infeasible,
            (false, true) => RoundStatus::Feasible,
            (false, false) => RoundStatus::NoSolution,
        };
        log::debug!(
            "{} round: {} after {} nodes, bound {:.9}, incumbent {:.9}",
            self.name(),
            status,
            nodes,
            best_bound,
            self.incumbent_objective
        );

        Ok(RoundOutcome {
            status,
            incumbent: self.incumbent.clone(),
            incumbent_objective: self.incumbent_objective,
            solutions,
            best_bound,
            relaxation,
            nodes,
        })
    }

    fn num_cuts(&self) -> usize {
        self.n_cuts
    }
}
