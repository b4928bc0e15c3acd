//! Mixed-integer linear programs and the cuts added to them.
//!
//! [`MipProgram`] is the solver-neutral description handed to a
//! [`MipOracle`](crate::oracle::MipOracle); [`LinearCut`] is the row type the
//! search adds between rounds. The RiskSLIM surrogate itself is assembled in
//! [`formulation`].

pub mod formulation;

pub use formulation::{build_formulation, loss_cut, MipIndices};

use crate::lp::{LinearProgram, Sense};

/// A decision variable of a [`MipProgram`].
#[derive(Debug, Clone, PartialEq)]
pub struct MipVariable {
    pub name: String,
    pub lb: f64,
    pub ub: f64,
    pub integer: bool,
    /// Coefficient in the (minimized) objective.
    pub objective: f64,
}

/// A linear row `coefs^T x (sense) rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub coefs: Vec<f64>,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    /// Left-hand side at `x`.
    pub fn activity(&self, x: &[f64]) -> f64 {
        self.coefs.iter().zip(x).map(|(a, x)| a * x).sum()
    }

    /// Amount by which `x` violates the row (zero when satisfied).
    pub fn violation(&self, x: &[f64]) -> f64 {
        let lhs = self.activity(x);
        match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        }
    }
}

/// Where a cut came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutSource {
    /// Loss cut at the coefficient vector `rho = 0` added before the first round.
    Seed,
    /// Loss cut at an integer solution returned by the solver.
    SolverSolution {
        /// Round that produced the solution.
        round: usize,
    },
    /// Loss cut at a rounded or polished solution.
    Heuristic,
    /// Loss cut from the continuous initialization pass.
    Initialization,
}

/// A linear cut: `coefs^T x <= rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearCut {
    /// Coefficient vector (dense, one entry per program variable).
    pub coefs: Vec<f64>,
    /// Right-hand side.
    pub rhs: f64,
    /// Source of this cut.
    pub source: CutSource,
}

impl LinearCut {
    /// Create a new cut.
    pub fn new(coefs: Vec<f64>, rhs: f64, source: CutSource) -> Self {
        Self { coefs, rhs, source }
    }

    /// `coefs^T x - rhs`; positive means violated.
    pub fn violation(&self, x: &[f64]) -> f64 {
        let lhs: f64 = self.coefs.iter().zip(x.iter()).map(|(a, x)| a * x).sum();
        lhs - self.rhs
    }

    /// True if the cut is violated by more than `tol`.
    pub fn is_violated(&self, x: &[f64], tol: f64) -> bool {
        self.violation(x) > tol
    }

    /// True when all coefficients are finite and at least one is nonzero.
    pub fn is_valid(&self) -> bool {
        let has_nonzero = self.coefs.iter().any(|c| c.abs() > 1e-12);
        let all_finite = self.coefs.iter().all(|c| c.is_finite()) && self.rhs.is_finite();
        has_nonzero && all_finite
    }

    /// The cut as a `<=` row.
    pub fn to_constraint(&self) -> Constraint {
        Constraint {
            coefs: self.coefs.clone(),
            sense: Sense::Le,
            rhs: self.rhs,
        }
    }
}

/// A mixed-integer linear program in minimization form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MipProgram {
    variables: Vec<MipVariable>,
    constraints: Vec<Constraint>,
}

impl MipProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a variable and return its index. Existing rows are padded with zeros.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        lb: f64,
        ub: f64,
        integer: bool,
        objective: f64,
    ) -> usize {
        self.variables.push(MipVariable {
            name: name.into(),
            lb,
            ub,
            integer,
            objective,
        });
        for row in self.constraints.iter_mut() {
            row.coefs.push(0.0);
        }
        self.variables.len() - 1
    }

    /// Append a row given as sparse `(index, coefficient)` pairs.
    pub fn add_constraint(&mut self, terms: &[(usize, f64)], sense: Sense, rhs: f64) {
        let mut coefs = vec![0.0; self.variables.len()];
        for &(j, a) in terms {
            coefs[j] += a;
        }
        self.constraints.push(Constraint { coefs, sense, rhs });
    }

    /// Append a cut as a `<=` row.
    pub fn add_cut(&mut self, cut: &LinearCut) {
        self.constraints.push(cut.to_constraint());
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn variables(&self) -> &[MipVariable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Replace the bounds of variable `j`.
    pub fn set_bounds(&mut self, j: usize, lb: f64, ub: f64) {
        if let Some(var) = self.variables.get_mut(j) {
            var.lb = lb;
            var.ub = ub;
        }
    }

    pub fn lower(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.lb).collect()
    }

    pub fn upper(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.ub).collect()
    }

    /// Indices of integer variables.
    pub fn integer_indices(&self) -> Vec<usize> {
        (0..self.variables.len())
            .filter(|&j| self.variables[j].integer)
            .collect()
    }

    /// Objective value at `x`.
    pub fn objective_value(&self, x: &[f64]) -> f64 {
        self.variables
            .iter()
            .zip(x)
            .map(|(v, x)| v.objective * x)
            .sum()
    }

    /// True if `x` satisfies bounds, rows and integrality within `tol`.
    pub fn is_feasible(&self, x: &[f64], tol: f64) -> bool {
        if x.len() != self.variables.len() {
            return false;
        }
        let in_bounds = self.variables.iter().zip(x).all(|(v, &x)| {
            x >= v.lb - tol && x <= v.ub + tol && (!v.integer || (x - x.round()).abs() <= tol)
        });
        in_bounds && self.constraints.iter().all(|c| c.violation(x) <= tol)
    }

    /// Continuous relaxation with the given bound overrides.
    pub fn relaxation(&self, lower: &[f64], upper: &[f64]) -> LinearProgram {
        let mut lp = LinearProgram::new(
            self.variables.iter().map(|v| v.objective).collect(),
            lower.to_vec(),
            upper.to_vec(),
        );
        for row in &self.constraints {
            lp.add_constraint(row.coefs.clone(), row.sense, row.rhs);
        }
        lp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cut_violation() {
        // Cut: x0 + x1 <= 1
        let cut = LinearCut::new(vec![1.0, 1.0], 1.0, CutSource::Heuristic);
        assert!(!cut.is_violated(&[0.5, 0.5], 1e-6));
        assert!(cut.is_violated(&[0.6, 0.6], 1e-6));
        assert_relative_eq!(cut.violation(&[0.6, 0.6]), 0.2, epsilon = 1e-10);
        assert!(cut.is_valid());
        assert!(!LinearCut::new(vec![0.0, 0.0], 1.0, CutSource::Seed).is_valid());
    }

    #[test]
    fn test_rows_grow_with_variables() {
        let mut program = MipProgram::new();
        let x = program.add_variable("x", 0.0, 3.0, true, 1.0);
        program.add_constraint(&[(x, 1.0)], Sense::Ge, 1.0);
        let y = program.add_variable("y", 0.0, 1.0, false, 2.0);
        assert_eq!(program.constraints()[0].coefs, vec![1.0, 0.0]);
        assert_eq!(program.integer_indices(), vec![x]);

        assert!(program.is_feasible(&[1.0, 0.5], 1e-9));
        assert!(!program.is_feasible(&[0.0, 0.5], 1e-9));
        assert!(!program.is_feasible(&[1.5, 0.5], 1e-9));
        assert_relative_eq!(program.objective_value(&[2.0, 0.5]), 3.0);
        assert_eq!(y, 1);
    }
}
