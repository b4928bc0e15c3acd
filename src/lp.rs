//! Bounded-variable linear programming with a dense two-phase simplex.
//!
//! Solves
//!
//! ```text
//! minimize   c^T x
//! subject to a_i^T x (<=, >=, =) b_i
//!            l <= x <= u
//! ```
//!
//! Variables are shifted onto their finite lower bound (or reflected onto
//! their finite upper bound, or split when free), finite upper bounds become
//! explicit rows, and Phase I drives artificial variables out before Phase II
//! optimizes the real objective. Pricing is Dantzig's rule, switching to
//! Bland's rule after a run of degenerate pivots to rule out cycling.

use std::time::Instant;

/// Constraint sense of a linear row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    /// `a^T x <= b`
    Le,
    /// `a^T x >= b`
    Ge,
    /// `a^T x = b`
    Eq,
}

impl Sense {
    fn flipped(self) -> Self {
        match self {
            Sense::Le => Sense::Ge,
            Sense::Ge => Sense::Le,
            Sense::Eq => Sense::Eq,
        }
    }
}

/// A linear program with dense rows and variable bounds.
#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    /// Objective coefficients (minimized).
    pub objective: Vec<f64>,
    /// Constraint rows, each of length `objective.len()`.
    pub constraints: Vec<Vec<f64>>,
    /// Sense of each row.
    pub senses: Vec<Sense>,
    /// Right-hand side of each row.
    pub rhs: Vec<f64>,
    /// Variable lower bounds (may be `-inf`).
    pub lower: Vec<f64>,
    /// Variable upper bounds (may be `+inf`).
    pub upper: Vec<f64>,
}

impl LinearProgram {
    /// Program with `n` variables bounded by `[lower, upper]` and no rows.
    pub fn new(objective: Vec<f64>, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        Self {
            objective,
            constraints: Vec::new(),
            senses: Vec::new(),
            rhs: Vec::new(),
            lower,
            upper,
        }
    }

    /// Append a row.
    pub fn add_constraint(&mut self, coefs: Vec<f64>, sense: Sense, rhs: f64) {
        self.constraints.push(coefs);
        self.senses.push(sense);
        self.rhs.push(rhs);
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.objective.len()
    }
}

/// Outcome of an LP solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    /// Optimal basic solution found.
    Optimal,
    /// No point satisfies the constraints.
    Infeasible,
    /// The objective decreases without bound.
    Unbounded,
    /// Iteration limit or deadline reached first.
    IterationLimit,
}

/// Result of [`minimize`].
#[derive(Debug, Clone)]
pub struct LpSolution {
    /// Solve status.
    pub status: LpStatus,
    /// Primal point (empty unless optimal).
    pub x: Vec<f64>,
    /// Objective value at `x` (`+inf` unless optimal).
    pub objective: f64,
    /// Simplex pivots performed.
    pub iterations: usize,
}

impl LpSolution {
    fn failed(status: LpStatus, iterations: usize) -> Self {
        Self {
            status,
            x: Vec::new(),
            objective: f64::INFINITY,
            iterations,
        }
    }
}

/// Simplex controls.
#[derive(Debug, Clone)]
pub struct SimplexConfig {
    /// Maximum pivots across both phases.
    pub max_iterations: usize,
    /// Pivot, feasibility and optimality tolerance.
    pub tolerance: f64,
    /// Give up once this instant has passed.
    pub deadline: Option<Instant>,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50_000,
            tolerance: 1e-9,
            deadline: None,
        }
    }
}

/// Consecutive degenerate pivots tolerated before switching to Bland's rule.
const DEGENERATE_SWITCH: usize = 50;

/// How an original variable maps onto non-negative tableau columns.
#[derive(Debug, Clone, Copy)]
enum ColumnMap {
    /// `x = offset + y`
    Shifted { col: usize, offset: f64 },
    /// `x = offset - y`
    Reflected { col: usize, offset: f64 },
    /// `x = y_pos - y_neg`
    Split { pos: usize, neg: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Structural,
    Slack,
    Artificial,
}

struct Tableau {
    /// Constraint rows; the last entry of each row is the right-hand side.
    rows: Vec<Vec<f64>>,
    /// Reduced costs; the last entry is minus the objective value.
    cost: Vec<f64>,
    basis: Vec<usize>,
    kinds: Vec<ColumnKind>,
    tol: f64,
}

impl Tableau {
    fn n_cols(&self) -> usize {
        self.kinds.len()
    }

    fn pivot(&mut self, r: usize, c: usize) {
        let width = self.n_cols() + 1;
        let inv = 1.0 / self.rows[r][c];
        for v in self.rows[r].iter_mut() {
            *v *= inv;
        }
        let pivot_row = self.rows[r].clone();
        for (i, row) in self.rows.iter_mut().enumerate() {
            if i == r {
                continue;
            }
            let factor = row[c];
            if factor != 0.0 {
                for j in 0..width {
                    row[j] -= factor * pivot_row[j];
                }
                row[c] = 0.0;
            }
        }
        let factor = self.cost[c];
        if factor != 0.0 {
            for j in 0..width {
                self.cost[j] -= factor * pivot_row[j];
            }
            self.cost[c] = 0.0;
        }
        self.basis[r] = c;
    }

    /// Load a cost vector and price out the current basis.
    fn set_cost(&mut self, costs: &[f64]) {
        let width = self.n_cols() + 1;
        self.cost = vec![0.0; width];
        self.cost[..costs.len()].copy_from_slice(costs);
        for (i, &b) in self.basis.iter().enumerate() {
            let cb = self.cost[b];
            if cb != 0.0 {
                for j in 0..width {
                    self.cost[j] -= cb * self.rows[i][j];
                }
            }
        }
    }

    /// Run simplex pivots on the loaded cost row.
    fn optimize(
        &mut self,
        allow_artificial: bool,
        iterations: &mut usize,
        config: &SimplexConfig,
    ) -> LpStatus {
        let rhs = self.n_cols();
        let mut degenerate_run = 0;
        loop {
            if *iterations >= config.max_iterations {
                return LpStatus::IterationLimit;
            }
            if let Some(deadline) = config.deadline {
                if Instant::now() >= deadline {
                    return LpStatus::IterationLimit;
                }
            }

            let bland = degenerate_run >= DEGENERATE_SWITCH;
            let mut entering = None;
            let mut best = -self.tol;
            for j in 0..self.n_cols() {
                if !allow_artificial && self.kinds[j] == ColumnKind::Artificial {
                    continue;
                }
                let d = self.cost[j];
                if d < best {
                    entering = Some(j);
                    if bland {
                        break;
                    }
                    best = d;
                }
            }
            let Some(c) = entering else {
                return LpStatus::Optimal;
            };

            let mut leaving: Option<(usize, f64)> = None;
            for (i, row) in self.rows.iter().enumerate() {
                let a = row[c];
                if a > self.tol {
                    let ratio = row[rhs] / a;
                    leaving = match leaving {
                        None => Some((i, ratio)),
                        Some((r, best_ratio)) => {
                            if ratio < best_ratio - self.tol
                                || (ratio <= best_ratio + self.tol
                                    && self.basis[i] < self.basis[r])
                            {
                                Some((i, ratio))
                            } else {
                                Some((r, best_ratio))
                            }
                        }
                    };
                }
            }
            let Some((r, ratio)) = leaving else {
                return LpStatus::Unbounded;
            };

            if ratio.abs() <= self.tol {
                degenerate_run += 1;
            } else {
                degenerate_run = 0;
            }
            self.pivot(r, c);
            *iterations += 1;
        }
    }
}

/// Minimize a linear program.
///
/// # Examples
///
/// ```
/// use riskslim::lp::{minimize, LinearProgram, Sense, SimplexConfig, LpStatus};
///
/// // minimize -x - y  s.t.  x + y <= 1,  0 <= x, y <= 1
/// let mut lp = LinearProgram::new(vec![-1.0, -1.0], vec![0.0, 0.0], vec![1.0, 1.0]);
/// lp.add_constraint(vec![1.0, 1.0], Sense::Le, 1.0);
///
/// let result = minimize(&lp, &SimplexConfig::default());
/// assert_eq!(result.status, LpStatus::Optimal);
/// assert!((result.objective + 1.0).abs() < 1e-9);
/// ```
pub fn minimize(lp: &LinearProgram, config: &SimplexConfig) -> LpSolution {
    let n = lp.num_vars();
    let tol = config.tolerance;

    for j in 0..n {
        if lp.lower[j] > lp.upper[j] + tol {
            return LpSolution::failed(LpStatus::Infeasible, 0);
        }
    }

    // Column mapping for the original variables.
    let mut maps = Vec::with_capacity(n);
    let mut n_struct = 0;
    for j in 0..n {
        let (l, u) = (lp.lower[j], lp.upper[j]);
        let map = if l.is_finite() {
            n_struct += 1;
            ColumnMap::Shifted {
                col: n_struct - 1,
                offset: l,
            }
        } else if u.is_finite() {
            n_struct += 1;
            ColumnMap::Reflected {
                col: n_struct - 1,
                offset: u,
            }
        } else {
            n_struct += 2;
            ColumnMap::Split {
                pos: n_struct - 2,
                neg: n_struct - 1,
            }
        };
        maps.push(map);
    }

    // Rows over the structural columns: (coefs, sense, rhs).
    let mut rows: Vec<(Vec<f64>, Sense, f64)> = Vec::new();
    for ((coefs, &sense), &b) in lp.constraints.iter().zip(&lp.senses).zip(&lp.rhs) {
        let mut row = vec![0.0; n_struct];
        let mut rhs = b;
        for (j, &a) in coefs.iter().enumerate() {
            if a == 0.0 {
                continue;
            }
            match maps[j] {
                ColumnMap::Shifted { col, offset } => {
                    row[col] += a;
                    rhs -= a * offset;
                }
                ColumnMap::Reflected { col, offset } => {
                    row[col] -= a;
                    rhs -= a * offset;
                }
                ColumnMap::Split { pos, neg } => {
                    row[pos] += a;
                    row[neg] -= a;
                }
            }
        }
        rows.push((row, sense, rhs));
    }
    for j in 0..n {
        if let ColumnMap::Shifted { col, offset } = maps[j] {
            if lp.upper[j].is_finite() {
                let mut row = vec![0.0; n_struct];
                row[col] = 1.0;
                rows.push((row, Sense::Le, (lp.upper[j] - offset).max(0.0)));
            }
        }
    }

    // Normalize to non-negative right-hand sides.
    for (row, sense, rhs) in rows.iter_mut() {
        if *rhs < 0.0 {
            row.iter_mut().for_each(|v| *v = -*v);
            *rhs = -*rhs;
            *sense = sense.flipped();
        }
    }

    let m = rows.len();
    let n_slack = rows.iter().filter(|(_, s, _)| *s != Sense::Eq).count();
    let n_art = rows.iter().filter(|(_, s, _)| *s != Sense::Le).count();
    let n_cols = n_struct + n_slack + n_art;

    let mut kinds = vec![ColumnKind::Structural; n_struct];
    kinds.extend(std::iter::repeat(ColumnKind::Slack).take(n_slack));
    kinds.extend(std::iter::repeat(ColumnKind::Artificial).take(n_art));

    let mut tableau_rows = Vec::with_capacity(m);
    let mut basis = Vec::with_capacity(m);
    let mut next_slack = n_struct;
    let mut next_art = n_struct + n_slack;
    for (row, sense, rhs) in rows {
        let mut full = vec![0.0; n_cols + 1];
        full[..n_struct].copy_from_slice(&row);
        full[n_cols] = rhs;
        match sense {
            Sense::Le => {
                full[next_slack] = 1.0;
                basis.push(next_slack);
                next_slack += 1;
            }
            Sense::Ge => {
                full[next_slack] = -1.0;
                next_slack += 1;
                full[next_art] = 1.0;
                basis.push(next_art);
                next_art += 1;
            }
            Sense::Eq => {
                full[next_art] = 1.0;
                basis.push(next_art);
                next_art += 1;
            }
        }
        tableau_rows.push(full);
    }

    let mut tableau = Tableau {
        rows: tableau_rows,
        cost: Vec::new(),
        basis,
        kinds,
        tol,
    };
    let mut iterations = 0;

    // Phase I
    if n_art > 0 {
        let mut phase_one = vec![0.0; n_cols];
        for c in phase_one.iter_mut().skip(n_struct + n_slack) {
            *c = 1.0;
        }
        tableau.set_cost(&phase_one);
        match tableau.optimize(true, &mut iterations, config) {
            LpStatus::Optimal => {}
            LpStatus::IterationLimit => {
                return LpSolution::failed(LpStatus::IterationLimit, iterations)
            }
            // Phase I is bounded below by zero; treat anything else as infeasible.
            _ => return LpSolution::failed(LpStatus::Infeasible, iterations),
        }
        let infeasibility = -tableau.cost[n_cols];
        let scale = 1.0 + lp.rhs.iter().fold(0.0_f64, |acc, b| acc.max(b.abs()));
        if infeasibility > tol.sqrt() * scale {
            return LpSolution::failed(LpStatus::Infeasible, iterations);
        }
        // Pivot remaining artificials out of the basis where possible.
        for r in 0..m {
            if tableau.kinds[tableau.basis[r]] != ColumnKind::Artificial {
                continue;
            }
            let replacement = (0..n_struct + n_slack).find(|&j| tableau.rows[r][j].abs() > tol);
            if let Some(c) = replacement {
                tableau.pivot(r, c);
            }
        }
    }

    // Phase II
    let mut costs = vec![0.0; n_cols];
    for j in 0..n {
        let c = lp.objective[j];
        match maps[j] {
            ColumnMap::Shifted { col, .. } => costs[col] += c,
            ColumnMap::Reflected { col, .. } => costs[col] -= c,
            ColumnMap::Split { pos, neg } => {
                costs[pos] += c;
                costs[neg] -= c;
            }
        }
    }
    tableau.set_cost(&costs);
    let status = tableau.optimize(false, &mut iterations, config);
    if status != LpStatus::Optimal {
        return LpSolution::failed(status, iterations);
    }

    let mut y = vec![0.0; n_cols];
    for (r, &b) in tableau.basis.iter().enumerate() {
        y[b] = tableau.rows[r][n_cols].max(0.0);
    }
    let x: Vec<f64> = (0..n)
        .map(|j| {
            let value = match maps[j] {
                ColumnMap::Shifted { col, offset } => offset + y[col],
                ColumnMap::Reflected { col, offset } => offset - y[col],
                ColumnMap::Split { pos, neg } => y[pos] - y[neg],
            };
            value.clamp(lp.lower[j], lp.upper[j])
        })
        .collect();
    let objective = x.iter().zip(&lp.objective).map(|(x, c)| x * c).sum();

    LpSolution {
        status: LpStatus::Optimal,
        x,
        objective,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_lp() {
        // minimize -x - 2y  s.t.  x + y <= 4,  x + 3y <= 6,  x, y >= 0
        let mut lp = LinearProgram::new(
            vec![-1.0, -2.0],
            vec![0.0, 0.0],
            vec![f64::INFINITY, f64::INFINITY],
        );
        lp.add_constraint(vec![1.0, 1.0], Sense::Le, 4.0);
        lp.add_constraint(vec![1.0, 3.0], Sense::Le, 6.0);

        let result = minimize(&lp, &SimplexConfig::default());
        assert_eq!(result.status, LpStatus::Optimal);
        assert_relative_eq!(result.x[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(result.x[1], 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.objective, -5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bounds_and_equalities() {
        // minimize x + y  s.t.  x - y = 1,  -3 <= x <= 3,  y >= -2 (free above)
        let mut lp = LinearProgram::new(vec![1.0, 1.0], vec![-3.0, -2.0], vec![3.0, f64::INFINITY]);
        lp.add_constraint(vec![1.0, -1.0], Sense::Eq, 1.0);

        let result = minimize(&lp, &SimplexConfig::default());
        assert_eq!(result.status, LpStatus::Optimal);
        assert_relative_eq!(result.x[0], -1.0, epsilon = 1e-9);
        assert_relative_eq!(result.x[1], -2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_free_and_reflected_variables() {
        // minimize t  s.t.  t >= x - 2,  t >= 2 - x,  x <= 5 (no lower bound), t free
        let mut lp = LinearProgram::new(
            vec![0.0, 1.0],
            vec![f64::NEG_INFINITY, f64::NEG_INFINITY],
            vec![5.0, f64::INFINITY],
        );
        lp.add_constraint(vec![-1.0, 1.0], Sense::Ge, -2.0);
        lp.add_constraint(vec![1.0, 1.0], Sense::Ge, 2.0);

        let result = minimize(&lp, &SimplexConfig::default());
        assert_eq!(result.status, LpStatus::Optimal);
        assert_relative_eq!(result.objective, 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.x[0], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_infeasible_lp() {
        // x + y <= 5 and x + y >= 6
        let mut lp = LinearProgram::new(vec![1.0, 1.0], vec![0.0, 0.0], vec![10.0, 10.0]);
        lp.add_constraint(vec![1.0, 1.0], Sense::Le, 5.0);
        lp.add_constraint(vec![1.0, 1.0], Sense::Ge, 6.0);

        let result = minimize(&lp, &SimplexConfig::default());
        assert_eq!(result.status, LpStatus::Infeasible);
        assert!(result.x.is_empty());
    }

    #[test]
    fn test_unbounded_lp() {
        let lp = LinearProgram::new(vec![-1.0], vec![0.0], vec![f64::INFINITY]);
        let result = minimize(&lp, &SimplexConfig::default());
        assert_eq!(result.status, LpStatus::Unbounded);
    }

    #[test]
    fn test_crossed_bounds_are_infeasible() {
        let lp = LinearProgram::new(vec![1.0], vec![2.0], vec![1.0]);
        let result = minimize(&lp, &SimplexConfig::default());
        assert_eq!(result.status, LpStatus::Infeasible);
    }
}
