//! Sparse integer risk scores.
//!
//! Fits linear classifiers with small integer coefficients by minimizing
//! logistic loss plus an L0 penalty with the lattice cutting-plane search in
//! [`lcpa`].

pub mod bounds;
pub mod classifier;
pub mod coefficients;
pub mod data;
pub mod error;
pub mod heuristics;
pub mod lcpa;
pub mod loss;
pub mod lp;
pub mod mip;
pub mod oracle;
pub mod settings;
pub mod solution;

pub use bounds::Bounds;
pub use classifier::RiskSlimClassifier;
pub use coefficients::{CoefficientSet, VarType, Variable};
pub use data::Dataset;
pub use error::{Result, RiskSlimError};
pub use lcpa::{model_size_bounds, optimize, CancelToken};
pub use loss::{LossComputation, LossOracle};
pub use mip::{build_formulation, MipIndices, MipProgram};
pub use oracle::{BranchAndBoundOracle, MipOracle};
pub use settings::Settings;
pub use solution::{Solution, SolutionInfo, TerminationReason};
