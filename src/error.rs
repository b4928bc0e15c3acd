//! Error types for the risk-score optimizer.

use thiserror::Error;

use crate::bounds::Bounds;

/// Errors surfaced by model construction and by the cutting-plane search.
#[derive(Error, Debug, Clone)]
pub enum RiskSlimError {
    /// Invalid or conflicting settings, bounds, or input data.
    ///
    /// Always raised before the first solver call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The solver proved that no integer solution satisfies the current bounds.
    #[error("infeasible problem: {message} (bounds: {bounds})")]
    InfeasibleProblem {
        /// What was proven infeasible.
        message: String,
        /// Envelope at the time infeasibility was proven.
        bounds: Bounds,
    },

    /// The solver backend failed for a reason other than infeasibility.
    #[error("solver failure: {message} (bounds: {bounds})")]
    Solver {
        /// Backend message.
        message: String,
        /// Envelope at the time of the failure.
        bounds: Bounds,
    },

    /// A classifier method that needs a fitted model was called before `fit`.
    #[error("model has not been fitted")]
    NotFitted,
}

impl RiskSlimError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        RiskSlimError::Configuration(msg.into())
    }

    /// Backend failure; the bounds snapshot is attached by the search loop.
    pub(crate) fn solver(msg: impl Into<String>) -> Self {
        RiskSlimError::Solver {
            message: msg.into(),
            bounds: Bounds::new(0, 0),
        }
    }

    /// Replace the bounds snapshot of a search error with `snapshot`.
    pub(crate) fn with_bounds(self, snapshot: &Bounds) -> Self {
        match self {
            RiskSlimError::InfeasibleProblem { message, .. } => RiskSlimError::InfeasibleProblem {
                message,
                bounds: snapshot.clone(),
            },
            RiskSlimError::Solver { message, .. } => RiskSlimError::Solver {
                message,
                bounds: snapshot.clone(),
            },
            other => other,
        }
    }

    /// Bounds snapshot attached to the error, if any.
    pub fn bounds(&self) -> Option<&Bounds> {
        match self {
            RiskSlimError::InfeasibleProblem { bounds, .. }
            | RiskSlimError::Solver { bounds, .. } => Some(bounds),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RiskSlimError>;
