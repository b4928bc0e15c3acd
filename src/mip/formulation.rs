//! The RiskSLIM surrogate program.
//!
//! Variables, in order: the coefficients `rho_0..rho_{P-1}`, one indicator
//! `alpha_j` per non-intercept coefficient, then `loss`, `objval` and `L0`.
//! The program minimizes `objval` subject to
//!
//! ```text
//! min(lb_j, 0) * alpha_j <= rho_j <= max(ub_j, 0) * alpha_j
//! objval = loss + sum_j c0_j * alpha_j
//! L0     = sum_{c0_j > 0} alpha_j
//! loss  >= L(rho_k) + grad L(rho_k) . (rho - rho_k)      (cuts)
//! ```

use crate::bounds::Bounds;
use crate::coefficients::CoefficientSet;
use crate::lp::Sense;
use crate::mip::{CutSource, LinearCut, MipProgram};

/// Positions of the RiskSLIM variables inside the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipIndices {
    /// Coefficient variables, one per column (intercept first).
    pub rho: Vec<usize>,
    /// Indicator variables, aligned with `rho`; `None` for the intercept.
    pub alpha: Vec<Option<usize>>,
    pub loss: usize,
    pub objval: usize,
    pub l0: usize,
    /// Total number of program variables: `2 * P - 1 + 3`.
    pub n_variables: usize,
}

impl MipIndices {
    /// Coefficient values of a program solution.
    pub fn coefficients(&self, x: &[f64]) -> Vec<f64> {
        self.rho.iter().map(|&j| x[j]).collect()
    }

    /// Full program point for an integer coefficient vector.
    ///
    /// Indicators follow the nonzero pattern; `loss` and `objval` are set
    /// from the supplied true values.
    pub fn lift(&self, coefficients: &CoefficientSet, rho: &[f64], loss: f64) -> Vec<f64> {
        let mut x = vec![0.0; self.n_variables];
        let mut penalty = 0.0;
        let mut size = 0.0;
        for (j, (&rj, var)) in rho.iter().zip(coefficients.variables()).enumerate() {
            x[self.rho[j]] = rj;
            if let Some(a) = self.alpha[j] {
                if rj != 0.0 {
                    x[a] = 1.0;
                    penalty += var.c0;
                    if var.c0 > 0.0 {
                        size += 1.0;
                    }
                }
            }
        }
        x[self.loss] = loss;
        x[self.objval] = loss + penalty;
        x[self.l0] = size;
        x
    }
}

/// Build the surrogate program for a coefficient set under `bounds`.
pub fn build_formulation(coefficients: &CoefficientSet, bounds: &Bounds) -> (MipProgram, MipIndices) {
    let mut program = MipProgram::new();
    let variables = coefficients.variables();

    let rho: Vec<usize> = variables
        .iter()
        .map(|v| program.add_variable(format!("rho_{}", v.name), v.lb, v.ub, v.is_integer(), 0.0))
        .collect();

    let alpha: Vec<Option<usize>> = variables
        .iter()
        .enumerate()
        .map(|(j, v)| {
            if j == 0 {
                return None;
            }
            let lb = if v.admits_zero() { 0.0 } else { 1.0 };
            Some(program.add_variable(format!("alpha_{}", v.name), lb, 1.0, true, 0.0))
        })
        .collect();

    let loss = program.add_variable("loss", bounds.loss_min, bounds.loss_max, false, 0.0);
    let objval = program.add_variable("objval", bounds.objval_min, bounds.objval_max, false, 1.0);
    let l0 = program.add_variable(
        "L0",
        bounds.min_size as f64,
        bounds.max_size as f64,
        false,
        0.0,
    );

    for (j, v) in variables.iter().enumerate() {
        let Some(a) = alpha[j] else { continue };
        program.add_constraint(&[(rho[j], 1.0), (a, -v.ub.max(0.0))], Sense::Le, 0.0);
        program.add_constraint(&[(rho[j], 1.0), (a, -v.lb.min(0.0))], Sense::Ge, 0.0);
    }

    let mut objective_terms = vec![(objval, 1.0), (loss, -1.0)];
    let mut size_terms = vec![(l0, 1.0)];
    for (j, v) in variables.iter().enumerate() {
        if let Some(a) = alpha[j] {
            if v.c0 > 0.0 {
                objective_terms.push((a, -v.c0));
                size_terms.push((a, -1.0));
            }
        }
    }
    program.add_constraint(&objective_terms, Sense::Eq, 0.0);
    program.add_constraint(&size_terms, Sense::Eq, 0.0);

    let n_variables = program.num_vars();
    let indices = MipIndices {
        rho,
        alpha,
        loss,
        objval,
        l0,
        n_variables,
    };
    (program, indices)
}

/// Loss cut `loss >= L(rho_k) + grad . (rho - rho_k)` as a `<=` row:
/// `grad . rho - loss <= grad . rho_k - L(rho_k)`.
pub fn loss_cut(
    indices: &MipIndices,
    rho_k: &[f64],
    loss_k: f64,
    gradient: &[f64],
    source: CutSource,
) -> LinearCut {
    let mut coefs = vec![0.0; indices.n_variables];
    let mut rhs = -loss_k;
    for ((&j, &g), &r) in indices.rho.iter().zip(gradient).zip(rho_k) {
        coefs[j] = g;
        rhs += g * r;
    }
    coefs[indices.loss] = -1.0;
    LinearCut::new(coefs, rhs, source)
}
