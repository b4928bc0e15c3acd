//! Estimator-style wrapper around [`optimize`](crate::lcpa::optimize).

use ndarray::{Array1, Array2};

use crate::coefficients::{CoefficientSet, VarType, DEFAULT_C0, DEFAULT_LB, DEFAULT_UB};
use crate::data::Dataset;
use crate::error::{Result, RiskSlimError};
use crate::lcpa::{model_size_bounds, optimize, CancelToken};
use crate::loss::logistic_loss;
use crate::oracle::BranchAndBoundOracle;
use crate::settings::Settings;
use crate::solution::SolutionInfo;

/// A sparse integer linear risk score.
///
/// The feature matrix passed to every method carries the intercept as its
/// first column of ones. Labels are `+1`/`-1`, with `0` read as `-1`.
///
/// ```no_run
/// use ndarray::array;
/// use riskslim::{RiskSlimClassifier, Settings};
///
/// let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 1.0], [1.0, 0.0]];
/// let y = array![-1.0, 1.0, 1.0, -1.0];
///
/// let mut model = RiskSlimClassifier::new(Settings::default()).max_size(1);
/// model.fit(x.clone(), y, None).unwrap();
/// let risk = model.predict_proba(&x).unwrap();
/// assert_eq!(risk.len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct RiskSlimClassifier {
    settings: Settings,
    min_size: usize,
    max_size: Option<usize>,
    min_coef: f64,
    max_coef: f64,
    c0_value: f64,
    vtype: VarType,
    max_abs_offset: Option<f64>,
    variable_names: Option<Vec<String>>,
    coefficient_set: Option<CoefficientSet>,
    cancel: CancelToken,
    fitted: Option<SolutionInfo>,
}

impl RiskSlimClassifier {
    /// Unfitted classifier with coefficients in `[-5, 5]` and `c0 = 1e-6`.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            min_size: 0,
            max_size: None,
            min_coef: DEFAULT_LB,
            max_coef: DEFAULT_UB,
            c0_value: DEFAULT_C0,
            vtype: VarType::Integer,
            max_abs_offset: None,
            variable_names: None,
            coefficient_set: None,
            cancel: CancelToken::new(),
            fitted: None,
        }
    }

    /// Minimum number of nonzero penalized coefficients.
    pub fn min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Maximum number of nonzero penalized coefficients.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn min_coef(mut self, min_coef: f64) -> Self {
        self.min_coef = min_coef;
        self
    }

    pub fn max_coef(mut self, max_coef: f64) -> Self {
        self.max_coef = max_coef;
        self
    }

    /// L0 penalty of every non-intercept coefficient.
    pub fn c0_value(mut self, c0_value: f64) -> Self {
        self.c0_value = c0_value;
        self
    }

    pub fn vtype(mut self, vtype: VarType) -> Self {
        self.vtype = vtype;
        self
    }

    /// Cap on the absolute value of the intercept.
    pub fn max_abs_offset(mut self, max_abs_offset: f64) -> Self {
        self.max_abs_offset = Some(max_abs_offset);
        self
    }

    /// Column names, intercept first. Generic names are used otherwise.
    pub fn variable_names(mut self, names: Vec<String>) -> Self {
        self.variable_names = Some(names);
        self
    }

    /// Use an explicit coefficient set instead of building one from
    /// `min_coef`, `max_coef`, `c0_value` and `vtype`.
    pub fn coefficient_set(mut self, coefficients: CoefficientSet) -> Self {
        self.coefficient_set = Some(coefficients);
        self
    }

    /// Token that stops a running `fit` from another thread. Every `fit`
    /// clears it on entry, so a cancellation only ends the fit in progress.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fit the score. Any previous fit is discarded first.
    pub fn fit(
        &mut self,
        x: Array2<f64>,
        y: Array1<f64>,
        sample_weights: Option<Array1<f64>>,
    ) -> Result<&SolutionInfo> {
        self.fitted = None;
        self.cancel.reset();
        let data = Dataset::new(x, y, sample_weights)?;

        let (mut coefficients, offset) = match &self.coefficient_set {
            Some(set) => (set.clone(), self.max_abs_offset),
            None => {
                let names = match &self.variable_names {
                    Some(names) => names.clone(),
                    None => CoefficientSet::generic_names(data.n_columns()),
                };
                let set = CoefficientSet::new(
                    names,
                    self.min_coef,
                    self.max_coef,
                    self.c0_value,
                    self.vtype,
                )?;
                (set, Some(self.max_abs_offset.unwrap_or(f64::INFINITY)))
            }
        };
        if coefficients.len() != data.n_columns() {
            return Err(RiskSlimError::config(format!(
                "{} coefficients for {} columns",
                coefficients.len(),
                data.n_columns()
            )));
        }

        let (min_size, max_size) = model_size_bounds(&coefficients, self.min_size, self.max_size)?;
        if let Some(offset) = offset {
            coefficients.update_intercept_bounds(&data, offset, max_size)?;
        }

        let mut oracle = BranchAndBoundOracle::default();
        let info = optimize(
            &data,
            &coefficients,
            (min_size, Some(max_size)),
            &self.settings,
            &mut oracle,
            &self.cancel,
        )?;
        Ok(&*self.fitted.insert(info))
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Search summary of the last fit.
    pub fn solution_info(&self) -> Result<&SolutionInfo> {
        self.fitted.as_ref().ok_or(RiskSlimError::NotFitted)
    }

    /// Fitted coefficients, intercept first.
    pub fn coefficients(&self) -> Result<&[f64]> {
        Ok(&self.solution_info()?.coefficients)
    }

    /// Score `x . rho` of each row.
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let rho = Array1::from(self.coefficients()?.to_vec());
        if x.ncols() != rho.len() {
            return Err(RiskSlimError::config(format!(
                "expected {} columns, got {}",
                rho.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(&rho))
    }

    /// Predicted labels; a zero score predicts `-1`.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .decision_function(x)?
            .mapv(|s| if s > 0.0 { 1.0 } else { -1.0 }))
    }

    /// Predicted probability of the positive class.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    /// Log of [`predict_proba`](Self::predict_proba), finite for any score.
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(|s| -logistic_loss(s)))
    }
}

/// Numerically stable logistic function.
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::TerminationReason;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn quick_settings() -> Settings {
        let mut settings = Settings::default().with_seed(7);
        settings.max_iterations = Some(50);
        settings.solver_node_limit = Some(500);
        settings
    }

    #[test]
    fn test_sigmoid() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert_relative_eq!(sigmoid(2.0) + sigmoid(-2.0), 1.0, epsilon = 1e-12);
        assert!(sigmoid(-800.0) >= 0.0);
        assert_relative_eq!(sigmoid(800.0), 1.0);
    }

    #[test]
    fn test_not_fitted() {
        let model = RiskSlimClassifier::new(Settings::default());
        let x = array![[1.0, 0.0]];
        assert!(!model.is_fitted());
        assert!(matches!(model.predict(&x), Err(RiskSlimError::NotFitted)));
        assert!(matches!(model.predict_proba(&x), Err(RiskSlimError::NotFitted)));
        assert!(matches!(model.coefficients(), Err(RiskSlimError::NotFitted)));
        assert!(matches!(model.solution_info(), Err(RiskSlimError::NotFitted)));
    }

    #[test]
    fn test_fit_and_predict() {
        let x = array![
            [1.0, 1.0, 0.0],
            [1.0, 1.0, 1.0],
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 1.0],
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 1.0],
        ];
        let y = array![1.0, 1.0, 1.0, 0.0, 0.0, -1.0];
        let mut model = RiskSlimClassifier::new(quick_settings())
            .max_size(1)
            .max_abs_offset(3.0);
        let info = model.fit(x.clone(), y, None).unwrap();
        assert!(info.l0_norm <= 1);

        let rho = model.coefficients().unwrap().to_vec();
        assert!(rho[0].abs() <= 3.0);
        assert!(rho.iter().all(|r| r.fract() == 0.0));

        let scores = model.decision_function(&x).unwrap();
        let labels = model.predict(&x).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        let log_proba = model.predict_log_proba(&x).unwrap();
        for i in 0..x.nrows() {
            let expected = if scores[i] > 0.0 { 1.0 } else { -1.0 };
            assert_eq!(labels[i], expected);
            assert_relative_eq!(proba[i], sigmoid(scores[i]));
            assert_relative_eq!(log_proba[i], proba[i].ln(), epsilon = 1e-12);
        }
        // Feature 1 separates the classes.
        assert!(rho[1] > 0.0);
    }

    #[test]
    fn test_refit_discards_previous_model() {
        let x = array![[1.0, 1.0], [1.0, 1.0], [1.0, 0.0], [1.0, 0.0]];
        let mut model = RiskSlimClassifier::new(quick_settings()).max_abs_offset(2.0);

        model.fit(x.clone(), array![1.0, 1.0, -1.0, -1.0], None).unwrap();
        let first = model.coefficients().unwrap().to_vec();
        model.fit(x.clone(), array![-1.0, -1.0, 1.0, 1.0], None).unwrap();
        let second = model.coefficients().unwrap().to_vec();
        assert!(first[1] > 0.0);
        assert!(second[1] < 0.0);

        assert!(model.fit(x, array![1.0, 2.0, 1.0, 1.0], None).is_err());
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_log_proba_stays_finite() {
        let x = array![[1.0, 400.0], [1.0, -400.0]];
        let mut model = RiskSlimClassifier::new(quick_settings());
        model
            .fit(array![[1.0, 1.0], [1.0, 0.0]], array![1.0, -1.0], None)
            .unwrap();
        if let Some(info) = model.fitted.as_mut() {
            info.coefficients = vec![0.0, 2.0];
        }
        let log_proba = model.predict_log_proba(&x).unwrap();
        assert_relative_eq!(log_proba[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(log_proba[1], -800.0, epsilon = 1e-9);
        assert!(log_proba.iter().all(|v| v.is_finite()));
        assert!(matches!(
            model.predict_log_proba(&array![[1.0]]),
            Err(RiskSlimError::Configuration(_))
        ));
    }

    #[test]
    fn test_cancellation_does_not_outlive_the_fit() {
        let x = array![[1.0, 1.0], [1.0, 1.0], [1.0, 0.0], [1.0, 0.0]];
        let y = array![1.0, 1.0, -1.0, -1.0];
        let mut model = RiskSlimClassifier::new(quick_settings()).max_abs_offset(2.0);
        model.cancel_token().cancel();

        let info = model.fit(x, y, None).unwrap();
        assert_ne!(info.termination, TerminationReason::Cancelled);
        assert!(info.coefficients[1] > 0.0);
        assert!(!model.cancel_token().is_cancelled());
    }

    #[test]
    fn test_column_mismatch() {
        let x = array![[1.0, 1.0], [1.0, 0.0]];
        let mut model = RiskSlimClassifier::new(quick_settings())
            .variable_names(vec!["(Intercept)".into(), "a".into(), "b".into()]);
        assert!(matches!(
            model.fit(x, array![1.0, -1.0], None),
            Err(RiskSlimError::Configuration(_))
        ));
    }
}
