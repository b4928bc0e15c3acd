//! Configuration for the lattice cutting-plane search.
//!
//! [`Settings`] is a typed, immutable bag of options. It can be built from
//! `Default` plus `with_*` helpers, or from a flat string-keyed map with
//! [`Settings::from_pairs`], which rejects unknown keys and type mismatches.

use crate::error::{Result, RiskSlimError};
use crate::loss::LossComputation;
use crate::oracle::SearchEmphasis;

/// A scalar value in a flat settings map.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Real value (may be infinite).
    Float(f64),
    /// Text value.
    Text(String),
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<i32> for SettingValue {
    fn from(v: i32) -> Self {
        SettingValue::Int(v as i64)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        SettingValue::Float(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::Text(v.to_string())
    }
}

/// Window of the search in which a heuristic is worth running.
///
/// A heuristic is active iff `start_cuts <= n_cuts <= stop_cuts` and
/// `stop_gap <= gap <= start_gap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicSchedule {
    /// Cuts needed before the heuristic starts.
    pub start_cuts: usize,
    /// Gap below which the heuristic may start.
    pub start_gap: f64,
    /// Cuts after which the heuristic stops.
    pub stop_cuts: usize,
    /// Gap below which the heuristic stops.
    pub stop_gap: f64,
}

impl HeuristicSchedule {
    /// Whether the heuristic should run at this point of the search.
    pub fn is_active(&self, n_cuts: usize, gap: f64) -> bool {
        self.start_cuts <= n_cuts
            && n_cuts <= self.stop_cuts
            && self.stop_gap <= gap
            && gap <= self.start_gap
    }
}

/// Validated settings for one optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    // === Termination ===
    /// Wall-clock budget in seconds (soft, checked between rounds).
    pub max_runtime: f64,
    /// Stop once the relative gap is at or below this value.
    pub max_tolerance: f64,
    /// Maximum number of solver rounds (None = unlimited).
    pub max_iterations: Option<usize>,

    // === Loss ===
    /// Loss computation strategy.
    pub loss_computation: LossComputation,
    /// Weight on positive rows.
    pub w_pos: f64,
    /// Weight on negative rows.
    pub w_neg: f64,

    // === Cuts and bounds ===
    /// Propagate tightened bounds into the program.
    pub chained_updates_flag: bool,
    /// Add loss cuts at solutions produced by rounding and polishing.
    pub add_cuts_at_heuristic_solutions: bool,
    /// Minimum surrogate underestimate for a loss cut to be added.
    pub cut_tolerance: f64,

    // === Rounding ===
    /// Run sequential rounding on relaxation solutions.
    pub round_flag: bool,
    /// Polish solutions produced by rounding.
    pub polish_rounded_solutions: bool,
    /// Only round/keep solutions with objective below `(1 + tol) * best`.
    pub rounding_tolerance: f64,
    /// Activation window for rounding.
    pub rounding_schedule: HeuristicSchedule,

    // === Polishing ===
    /// Polish integer solutions with discrete coordinate descent.
    pub polish_flag: bool,
    /// Only polish solutions with objective below `(1 + tol) * best`.
    pub polishing_tolerance: f64,
    /// Time budget per polishing invocation in seconds.
    pub polishing_max_runtime: f64,
    /// Maximum solutions polished per invocation.
    pub polishing_max_solutions: usize,
    /// Activation window for polishing.
    pub polishing_schedule: HeuristicSchedule,
    /// Capacity of the solution pool.
    pub solution_pool_size: usize,

    // === Initialization ===
    /// Run the continuous cutting-plane initialization before the main loop.
    pub initialization_flag: bool,
    /// Log progress of the initialization procedure at info level.
    pub init_display_progress: bool,
    /// Log every initialization LP solve at info level.
    pub init_display_solver_progress: bool,
    /// Time budget of the initialization procedure in seconds.
    pub init_max_runtime: f64,
    /// Maximum cutting-plane iterations in the initialization.
    pub init_max_iterations: usize,
    /// Gap at which the initialization stops.
    pub init_max_tolerance: f64,
    /// Time budget per initialization LP in seconds.
    pub init_max_runtime_per_iteration: f64,
    /// Round relaxation solutions found during initialization.
    pub init_use_sequential_rounding: bool,
    /// Time budget for rounding during initialization.
    pub init_sequential_rounding_max_runtime: f64,
    /// Relaxation solutions rounded during initialization.
    pub init_sequential_rounding_max_solutions: usize,
    /// Polish after rounding during initialization.
    pub init_polishing_after: bool,
    /// Time budget for polishing during initialization.
    pub init_polishing_max_runtime: f64,
    /// Solutions polished during initialization.
    pub init_polishing_max_solutions: usize,

    // === Solver ===
    /// Log solver progress at info level.
    pub display_solver_progress: bool,
    /// Seed handed to the solver and heuristics.
    pub solver_randomseed: u64,
    /// Search emphasis for the solver.
    pub solver_mipemphasis: SearchEmphasis,
    /// Node limit per solver round (None = unlimited).
    pub solver_node_limit: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_runtime: 300.0,
            max_tolerance: f64::EPSILON,
            max_iterations: None,

            loss_computation: LossComputation::Normal,
            w_pos: 1.0,
            w_neg: 1.0,

            chained_updates_flag: true,
            add_cuts_at_heuristic_solutions: true,
            cut_tolerance: 1e-9,

            round_flag: true,
            polish_rounded_solutions: true,
            rounding_tolerance: f64::INFINITY,
            rounding_schedule: HeuristicSchedule {
                start_cuts: 0,
                start_gap: f64::INFINITY,
                stop_cuts: 20_000,
                stop_gap: 0.2,
            },

            polish_flag: true,
            polishing_tolerance: 0.1,
            polishing_max_runtime: 10.0,
            polishing_max_solutions: 5,
            polishing_schedule: HeuristicSchedule {
                start_cuts: 0,
                start_gap: f64::INFINITY,
                stop_cuts: usize::MAX,
                stop_gap: 5.0,
            },
            solution_pool_size: 100,

            initialization_flag: false,
            init_display_progress: false,
            init_display_solver_progress: false,
            init_max_runtime: 300.0,
            init_max_iterations: 10_000,
            init_max_tolerance: 1e-4,
            init_max_runtime_per_iteration: 300.0,
            init_use_sequential_rounding: true,
            init_sequential_rounding_max_runtime: 30.0,
            init_sequential_rounding_max_solutions: 5,
            init_polishing_after: true,
            init_polishing_max_runtime: 30.0,
            init_polishing_max_solutions: 5,

            display_solver_progress: false,
            solver_randomseed: 0,
            solver_mipemphasis: SearchEmphasis::Balanced,
            solver_node_limit: None,
        }
    }
}

impl Settings {
    /// Build settings from a flat key/value map on top of the defaults.
    ///
    /// The `cplex_randomseed`, `cplex_mipemphasis`, `display_cplex_progress`
    /// and `init_display_cplex_progress` keys are read as their `solver_`
    /// counterparts. `tight_formulation` is accepted; the indicator rows
    /// always use the per-coefficient bounds, so `false` only logs a warning.
    pub fn from_pairs<I, K>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, SettingValue)>,
        K: AsRef<str>,
    {
        let mut settings = Self::default();
        for (key, value) in pairs {
            settings.apply(key.as_ref(), value)?;
        }
        settings.validate()?;
        Ok(settings)
    }

    fn apply(&mut self, key: &str, value: SettingValue) -> Result<()> {
        match key {
            "max_runtime" => self.max_runtime = real(key, &value)?,
            "max_tolerance" => self.max_tolerance = real(key, &value)?,
            "max_iterations" => self.max_iterations = limit(key, &value)?,
            "loss_computation" => self.loss_computation = text(key, &value)?.parse()?,
            "w_pos" => self.w_pos = real(key, &value)?,
            "w_neg" => self.w_neg = real(key, &value)?,
            "chained_updates_flag" => self.chained_updates_flag = flag(key, &value)?,
            "add_cuts_at_heuristic_solutions" => {
                self.add_cuts_at_heuristic_solutions = flag(key, &value)?
            }
            "cut_tolerance" => self.cut_tolerance = real(key, &value)?,
            "round_flag" => self.round_flag = flag(key, &value)?,
            "polish_rounded_solutions" => self.polish_rounded_solutions = flag(key, &value)?,
            "rounding_tolerance" => self.rounding_tolerance = real(key, &value)?,
            "rounding_start_cuts" => self.rounding_schedule.start_cuts = count(key, &value)?,
            "rounding_start_gap" => self.rounding_schedule.start_gap = real(key, &value)?,
            "rounding_stop_cuts" => self.rounding_schedule.stop_cuts = count(key, &value)?,
            "rounding_stop_gap" => self.rounding_schedule.stop_gap = real(key, &value)?,
            "polish_flag" => self.polish_flag = flag(key, &value)?,
            "polishing_tolerance" => self.polishing_tolerance = real(key, &value)?,
            "polishing_max_runtime" => self.polishing_max_runtime = real(key, &value)?,
            "polishing_max_solutions" => self.polishing_max_solutions = count(key, &value)?,
            "polishing_start_cuts" => self.polishing_schedule.start_cuts = count(key, &value)?,
            "polishing_start_gap" => self.polishing_schedule.start_gap = real(key, &value)?,
            "polishing_stop_cuts" => self.polishing_schedule.stop_cuts = count(key, &value)?,
            "polishing_stop_gap" => self.polishing_schedule.stop_gap = real(key, &value)?,
            "solution_pool_size" => self.solution_pool_size = count(key, &value)?,
            "initialization_flag" => self.initialization_flag = flag(key, &value)?,
            "init_display_progress" => self.init_display_progress = flag(key, &value)?,
            "init_display_solver_progress" | "init_display_cplex_progress" => {
                self.init_display_solver_progress = flag(key, &value)?
            }
            "init_max_runtime" => self.init_max_runtime = real(key, &value)?,
            "init_max_iterations" => self.init_max_iterations = count(key, &value)?,
            "init_max_tolerance" => self.init_max_tolerance = real(key, &value)?,
            "init_max_runtime_per_iteration" => {
                self.init_max_runtime_per_iteration = real(key, &value)?
            }
            "init_use_sequential_rounding" => {
                self.init_use_sequential_rounding = flag(key, &value)?
            }
            "init_sequential_rounding_max_runtime" => {
                self.init_sequential_rounding_max_runtime = real(key, &value)?
            }
            "init_sequential_rounding_max_solutions" => {
                self.init_sequential_rounding_max_solutions = count(key, &value)?
            }
            "init_polishing_after" => self.init_polishing_after = flag(key, &value)?,
            "init_polishing_max_runtime" => self.init_polishing_max_runtime = real(key, &value)?,
            "init_polishing_max_solutions" => {
                self.init_polishing_max_solutions = count(key, &value)?
            }
            "display_solver_progress" | "display_cplex_progress" => {
                self.display_solver_progress = flag(key, &value)?
            }
            "solver_randomseed" | "cplex_randomseed" => {
                self.solver_randomseed = count(key, &value)? as u64
            }
            "solver_mipemphasis" | "cplex_mipemphasis" => {
                self.solver_mipemphasis = SearchEmphasis::from_code(count(key, &value)?)?
            }
            "solver_node_limit" => self.solver_node_limit = limit(key, &value)?,
            "tight_formulation" => {
                if !flag(key, &value)? {
                    log::warn!(
                        "tight_formulation = false is ignored; bounded indicator rows are always used"
                    );
                }
            }
            _ => {
                return Err(RiskSlimError::config(format!(
                    "unrecognized setting '{}'",
                    key
                )))
            }
        }
        Ok(())
    }

    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("max_runtime", self.max_runtime),
            ("max_tolerance", self.max_tolerance),
            ("cut_tolerance", self.cut_tolerance),
            ("rounding_tolerance", self.rounding_tolerance),
            ("rounding_start_gap", self.rounding_schedule.start_gap),
            ("rounding_stop_gap", self.rounding_schedule.stop_gap),
            ("polishing_tolerance", self.polishing_tolerance),
            ("polishing_max_runtime", self.polishing_max_runtime),
            ("polishing_start_gap", self.polishing_schedule.start_gap),
            ("polishing_stop_gap", self.polishing_schedule.stop_gap),
            ("init_max_runtime", self.init_max_runtime),
            ("init_max_tolerance", self.init_max_tolerance),
            ("init_max_runtime_per_iteration", self.init_max_runtime_per_iteration),
            (
                "init_sequential_rounding_max_runtime",
                self.init_sequential_rounding_max_runtime,
            ),
            ("init_polishing_max_runtime", self.init_polishing_max_runtime),
        ];
        for (name, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                return Err(RiskSlimError::config(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [("w_pos", self.w_pos), ("w_neg", self.w_neg)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(RiskSlimError::config(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        if self.solution_pool_size == 0 {
            return Err(RiskSlimError::config("solution_pool_size must be at least 1"));
        }
        Ok(())
    }

    /// Set the wall-clock budget in seconds.
    pub fn with_max_runtime(mut self, seconds: f64) -> Self {
        self.max_runtime = seconds;
        self
    }

    /// Set the loss computation strategy.
    pub fn with_loss_computation(mut self, loss: LossComputation) -> Self {
        self.loss_computation = loss;
        self
    }

    /// Set the random seed used by the solver and heuristics.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.solver_randomseed = seed;
        self
    }

    /// Enable or disable the initialization procedure.
    pub fn with_initialization(mut self, enabled: bool) -> Self {
        self.initialization_flag = enabled;
        self
    }

    /// Enable or disable both heuristics.
    pub fn with_heuristics(mut self, enabled: bool) -> Self {
        self.round_flag = enabled;
        self.polish_flag = enabled;
        self
    }
}

fn type_error(key: &str, expected: &str, value: &SettingValue) -> RiskSlimError {
    RiskSlimError::config(format!(
        "setting '{}' expects {}, got {:?}",
        key, expected, value
    ))
}

fn flag(key: &str, value: &SettingValue) -> Result<bool> {
    match value {
        SettingValue::Bool(b) => Ok(*b),
        _ => Err(type_error(key, "a boolean", value)),
    }
}

fn real(key: &str, value: &SettingValue) -> Result<f64> {
    match value {
        SettingValue::Float(v) => Ok(*v),
        SettingValue::Int(v) => Ok(*v as f64),
        _ => Err(type_error(key, "a number", value)),
    }
}

fn text<'a>(key: &str, value: &'a SettingValue) -> Result<&'a str> {
    match value {
        SettingValue::Text(s) => Ok(s.as_str()),
        _ => Err(type_error(key, "a string", value)),
    }
}

/// Non-negative integer; `+inf` maps to `usize::MAX`.
fn count(key: &str, value: &SettingValue) -> Result<usize> {
    match value {
        SettingValue::Int(v) if *v >= 0 => Ok(*v as usize),
        SettingValue::Float(v) if *v == f64::INFINITY => Ok(usize::MAX),
        SettingValue::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Ok(*v as usize),
        _ => Err(type_error(key, "a non-negative integer", value)),
    }
}

/// Optional limit; `+inf` means unlimited.
fn limit(key: &str, value: &SettingValue) -> Result<Option<usize>> {
    let n = count(key, value)?;
    Ok(if n == usize::MAX { None } else { Some(n) })
}
