//! Admissible coefficient domains.
//!
//! A [`CoefficientSet`] declares, per model column, the bounds, type and L0
//! penalty of the coefficient. Position 0 is always the intercept, which is
//! never penalized.

use std::fmt;

use crate::data::Dataset;
use crate::error::{Result, RiskSlimError};

/// Default lower bound on every coefficient.
pub const DEFAULT_LB: f64 = -5.0;
/// Default upper bound on every coefficient.
pub const DEFAULT_UB: f64 = 5.0;
/// Default L0 penalty on every non-intercept coefficient.
pub const DEFAULT_C0: f64 = 1e-6;
/// Name given to the intercept column when names are generated.
pub const INTERCEPT_NAME: &str = "(Intercept)";

/// Domain type of a coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    /// Integer-valued coefficient.
    Integer,
    /// Real-valued coefficient.
    Continuous,
}

/// A value given either once for all variables or once per variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Broadcast<T> {
    /// Same value for every variable.
    Scalar(T),
    /// One value per variable, aligned by position.
    PerVariable(Vec<T>),
}

impl<T: Clone> Broadcast<T> {
    fn expand(&self, n: usize, field: &str) -> Result<Vec<T>> {
        match self {
            Broadcast::Scalar(v) => Ok(vec![v.clone(); n]),
            Broadcast::PerVariable(values) if values.len() == n => Ok(values.clone()),
            Broadcast::PerVariable(values) => Err(RiskSlimError::config(format!(
                "{} has {} entries, expected {}",
                field,
                values.len(),
                n
            ))),
        }
    }
}

impl From<f64> for Broadcast<f64> {
    fn from(v: f64) -> Self {
        Broadcast::Scalar(v)
    }
}

impl From<Vec<f64>> for Broadcast<f64> {
    fn from(v: Vec<f64>) -> Self {
        Broadcast::PerVariable(v)
    }
}

impl From<VarType> for Broadcast<VarType> {
    fn from(v: VarType) -> Self {
        Broadcast::Scalar(v)
    }
}

/// One model coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Column name.
    pub name: String,
    /// Lower bound.
    pub lb: f64,
    /// Upper bound.
    pub ub: f64,
    /// Domain type.
    pub vtype: VarType,
    /// L0 penalty paid when the coefficient is nonzero.
    pub c0: f64,
}

impl Variable {
    /// Whether the coefficient must be integer.
    pub fn is_integer(&self) -> bool {
        self.vtype == VarType::Integer
    }

    /// Whether zero lies inside the domain.
    pub fn admits_zero(&self) -> bool {
        self.lb <= 0.0 && 0.0 <= self.ub
    }
}

/// Ordered coefficient domains, intercept first.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientSet {
    variables: Vec<Variable>,
}

impl CoefficientSet {
    /// Build a coefficient set from broadcastable bound, penalty and type specifications.
    pub fn new(
        names: Vec<String>,
        lb: impl Into<Broadcast<f64>>,
        ub: impl Into<Broadcast<f64>>,
        c0: impl Into<Broadcast<f64>>,
        vtype: impl Into<Broadcast<VarType>>,
    ) -> Result<Self> {
        let n = names.len();
        if n == 0 {
            return Err(RiskSlimError::config("coefficient set needs at least one variable"));
        }
        let lb = lb.into().expand(n, "lb")?;
        let ub = ub.into().expand(n, "ub")?;
        let c0 = c0.into().expand(n, "c0")?;
        let vtype = vtype.into().expand(n, "vtype")?;

        let mut variables = Vec::with_capacity(n);
        for (j, name) in names.into_iter().enumerate() {
            let mut var = Variable {
                name,
                lb: lb[j],
                ub: ub[j],
                vtype: vtype[j],
                c0: if j == 0 { 0.0 } else { c0[j] },
            };
            check_variable(&mut var)?;
            variables.push(var);
        }
        Ok(Self { variables })
    }

    /// Coefficient set with the default domain `[-5, 5]`, integer, `c0 = 1e-6`.
    pub fn with_defaults(names: Vec<String>) -> Result<Self> {
        Self::new(names, DEFAULT_LB, DEFAULT_UB, DEFAULT_C0, VarType::Integer)
    }

    /// Generated names for `p` columns, intercept first.
    pub fn generic_names(p: usize) -> Vec<String> {
        (0..p)
            .map(|j| {
                if j == 0 {
                    INTERCEPT_NAME.to_string()
                } else {
                    format!("var_{}", j)
                }
            })
            .collect()
    }

    /// Number of variables including the intercept.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Always false: construction rejects empty sets.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// The variables in model order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Variable names in model order.
    pub fn names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    /// Lower bounds in model order.
    pub fn lb(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.lb).collect()
    }

    /// Upper bounds in model order.
    pub fn ub(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.ub).collect()
    }

    /// L0 penalties in model order.
    pub fn c0(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.c0).collect()
    }

    /// Indices of penalized (c0 > 0) variables.
    pub fn penalized_indices(&self) -> Vec<usize> {
        (1..self.len()).filter(|&j| self.variables[j].c0 > 0.0).collect()
    }

    /// Nonzero penalties, used by chained bound updates.
    pub fn c0_nonzero(&self) -> Vec<f64> {
        self.penalized_indices()
            .into_iter()
            .map(|j| self.variables[j].c0)
            .collect()
    }

    /// Largest meaningful model size: the number of penalized variables.
    pub fn trivial_max_size(&self) -> usize {
        self.penalized_indices().len()
    }

    /// True when every coefficient is an integer with finite bounds.
    pub fn all_integer_bounded(&self) -> bool {
        self.variables
            .iter()
            .all(|v| v.is_integer() && v.lb.is_finite() && v.ub.is_finite())
    }

    /// L0 penalty of a coefficient vector.
    pub fn penalty(&self, rho: &[f64]) -> f64 {
        self.variables
            .iter()
            .zip(rho)
            .filter(|(_, &r)| r != 0.0)
            .map(|(v, _)| v.c0)
            .sum()
    }

    /// Number of nonzero penalized coefficients.
    pub fn model_size(&self, rho: &[f64]) -> usize {
        self.variables
            .iter()
            .zip(rho)
            .filter(|(v, &r)| v.c0 > 0.0 && r != 0.0)
            .count()
    }

    /// Replace the bounds of one variable.
    pub fn set_bounds(&mut self, j: usize, lb: f64, ub: f64) -> Result<()> {
        let var = self.variables.get_mut(j).ok_or_else(|| {
            RiskSlimError::config(format!("variable index {} out of range", j))
        })?;
        let mut updated = var.clone();
        updated.lb = lb;
        updated.ub = ub;
        check_variable(&mut updated)?;
        *var = updated;
        Ok(())
    }

    /// Tighten the intercept bounds to the smallest symmetric range that still
    /// lets a model with at most `max_l0_value` nonzeros classify every row
    /// both ways, capped at `max_offset`.
    pub fn update_intercept_bounds(
        &mut self,
        data: &Dataset,
        max_offset: f64,
        max_l0_value: usize,
    ) -> Result<()> {
        if max_offset.is_nan() || max_offset < 0.0 {
            return Err(RiskSlimError::config(format!(
                "max_offset must be non-negative, got {}",
                max_offset
            )));
        }
        if data.n_columns() != self.len() {
            return Err(RiskSlimError::config(format!(
                "data has {} columns, coefficient set has {}",
                data.n_columns(),
                self.len()
            )));
        }

        let (z_min, z_max) = data.z_column_ranges();
        let (s_min, s_max) = score_bounds(
            &self.variables[1..],
            z_min.as_slice().map(|s| &s[1..]).unwrap_or(&[]),
            z_max.as_slice().map(|s| &s[1..]).unwrap_or(&[]),
            max_l0_value,
        );
        let conservative_offset = s_min.abs().max(s_max.abs()) + 1.0;
        let mut offset = max_offset.min(conservative_offset);
        if self.variables[0].is_integer() {
            offset = offset.floor();
        }
        log::debug!(
            "intercept bounds set to [{}, {}] (conservative offset {})",
            -offset,
            offset,
            conservative_offset
        );
        self.set_bounds(0, -offset, offset)
    }
}

fn check_variable(var: &mut Variable) -> Result<()> {
    if var.lb.is_nan() || var.ub.is_nan() {
        return Err(RiskSlimError::config(format!(
            "bounds of '{}' must not be NaN",
            var.name
        )));
    }
    if var.lb > var.ub {
        return Err(RiskSlimError::config(format!(
            "lower bound {} exceeds upper bound {} for '{}'",
            var.lb, var.ub, var.name
        )));
    }
    if !var.c0.is_finite() || var.c0 < 0.0 {
        return Err(RiskSlimError::config(format!(
            "L0 penalty of '{}' must be finite and non-negative, got {}",
            var.name, var.c0
        )));
    }
    if var.is_integer() {
        let lb = var.lb.ceil();
        let ub = var.ub.floor();
        if lb > ub {
            return Err(RiskSlimError::config(format!(
                "'{}' has no integer value in [{}, {}]",
                var.name, var.lb, var.ub
            )));
        }
        var.lb = lb;
        var.ub = ub;
    }
    Ok(())
}

/// Smallest and largest coefficient contribution of one variable given the
/// range `[z_lo, z_hi]` of its column. Penalized variables that admit zero
/// can always contribute nothing.
fn contribution_range(var: &Variable, z_lo: f64, z_hi: f64) -> (f64, f64) {
    let edges = [z_lo * var.lb, z_lo * var.ub, z_hi * var.lb, z_hi * var.ub];
    let mut lo = edges.iter().cloned().fold(f64::INFINITY, f64::min);
    let mut hi = edges.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if var.admits_zero() {
        lo = lo.min(0.0);
        hi = hi.max(0.0);
    }
    (lo, hi)
}

/// Sum of the `k` most extreme entries: smallest when `largest` is false.
pub(crate) fn extreme_sum(values: &mut [f64], k: usize, largest: bool) -> f64 {
    if largest {
        values.sort_by(|a, b| b.total_cmp(a));
    } else {
        values.sort_by(|a, b| a.total_cmp(b));
    }
    values.iter().take(k).sum()
}

/// Score range attainable with at most `max_l0` nonzero penalized coefficients.
///
/// `z_min`/`z_max` hold column-wise ranges aligned with `variables`.
pub(crate) fn score_bounds(
    variables: &[Variable],
    z_min: &[f64],
    z_max: &[f64],
    max_l0: usize,
) -> (f64, f64) {
    let mut reg_lo = Vec::new();
    let mut reg_hi = Vec::new();
    let mut s_min = 0.0;
    let mut s_max = 0.0;
    for ((var, &lo), &hi) in variables.iter().zip(z_min).zip(z_max) {
        let (c_lo, c_hi) = contribution_range(var, lo, hi);
        if var.c0 > 0.0 {
            reg_lo.push(c_lo);
            reg_hi.push(c_hi);
        } else {
            s_min += c_lo;
            s_max += c_hi;
        }
    }
    s_min += extreme_sum(&mut reg_lo, max_l0, false);
    s_max += extreme_sum(&mut reg_hi, max_l0, true);
    (s_min, s_max)
}

impl fmt::Display for CoefficientSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .variables
            .iter()
            .map(|v| v.name.len())
            .max()
            .unwrap_or(0)
            .max(8);
        writeln!(
            f,
            "{:<width$}  {:>8}  {:>8}  {:>5}  {:>10}",
            "variable",
            "lb",
            "ub",
            "type",
            "c0",
            width = width
        )?;
        for v in &self.variables {
            let vtype = match v.vtype {
                VarType::Integer => "I",
                VarType::Continuous => "C",
            };
            writeln!(
                f,
                "{:<width$}  {:>8}  {:>8}  {:>5}  {:>10.2e}",
                v.name,
                v.lb,
                v.ub,
                vtype,
                v.c0,
                width = width
            )?;
        }
        Ok(())
    }
}
