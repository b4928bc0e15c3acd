//! Validated training data.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Result, RiskSlimError};

/// Feature matrix, labels and per-row weights for one optimization run.
///
/// The first column of `x` must be all ones (the intercept). Labels are
/// stored in {+1, -1}; zero labels are coerced to -1. Sample weights are
/// normalized to mean one and then scaled by the class weights.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f64>,
    y: Array1<f64>,
    weights: Array1<f64>,
    /// Row-wise `y_i * x_i`.
    z: Array2<f64>,
}

impl Dataset {
    /// Validate and wrap the training data.
    pub fn new(
        x: Array2<f64>,
        y: Array1<f64>,
        sample_weights: Option<Array1<f64>>,
    ) -> Result<Self> {
        let (n, p) = x.dim();
        if n == 0 || p == 0 {
            return Err(RiskSlimError::config("feature matrix is empty"));
        }
        if y.len() != n {
            return Err(RiskSlimError::config(format!(
                "expected {} labels, got {}",
                n,
                y.len()
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(RiskSlimError::config("feature matrix has non-finite entries"));
        }
        if x.column(0).iter().any(|&v| v != 1.0) {
            return Err(RiskSlimError::config(
                "first column of the feature matrix must be all ones (intercept)",
            ));
        }

        let mut y = y;
        for label in y.iter_mut() {
            if *label == 0.0 {
                *label = -1.0;
            } else if *label != 1.0 && *label != -1.0 {
                return Err(RiskSlimError::config(format!(
                    "labels must be in {{-1, 0, 1}}, got {}",
                    label
                )));
            }
        }

        let weights = match sample_weights {
            Some(w) => {
                if w.len() != n {
                    return Err(RiskSlimError::config(format!(
                        "expected {} sample weights, got {}",
                        n,
                        w.len()
                    )));
                }
                if w.iter().any(|&v| !v.is_finite() || v <= 0.0) {
                    return Err(RiskSlimError::config("sample weights must be positive"));
                }
                let mean = w.sum() / n as f64;
                w / mean
            }
            None => Array1::ones(n),
        };

        let z = &x * &y.view().insert_axis(Axis(1));

        Ok(Self { x, y, weights, z })
    }

    /// Scale row weights by class: `w_pos` for positive rows, `w_neg` for negative rows.
    pub fn with_class_weights(mut self, w_pos: f64, w_neg: f64) -> Self {
        for (w, &label) in self.weights.iter_mut().zip(self.y.iter()) {
            *w *= if label > 0.0 { w_pos } else { w_neg };
        }
        self
    }

    /// Number of rows.
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    /// Number of columns including the intercept.
    pub fn n_columns(&self) -> usize {
        self.x.ncols()
    }

    /// Feature matrix.
    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    /// Labels in {+1, -1}.
    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    /// Row weights.
    pub fn weights(&self) -> ArrayView1<'_, f64> {
        self.weights.view()
    }

    /// Label-signed feature matrix `Z = diag(y) X`.
    pub fn z(&self) -> ArrayView2<'_, f64> {
        self.z.view()
    }

    /// True when every row carries weight one.
    pub fn is_unweighted(&self) -> bool {
        self.weights.iter().all(|&w| w == 1.0)
    }

    /// True when every entry of the feature matrix is an integer.
    pub fn is_integer_valued(&self) -> bool {
        self.x.iter().all(|v| v.fract() == 0.0)
    }

    /// Per-column minimum and maximum of `Z`.
    pub fn z_column_ranges(&self) -> (Array1<f64>, Array1<f64>) {
        let mins = self
            .z
            .fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
        let maxs = self
            .z
            .fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));
        (mins, maxs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_zero_labels_coerced() {
        let x = array![[1.0, 0.0], [1.0, 1.0]];
        let data = Dataset::new(x, array![0.0, 1.0], None).unwrap();
        assert_eq!(data.y(), array![-1.0, 1.0]);
        assert_eq!(data.z(), array![[-1.0, -0.0], [1.0, 1.0]]);
    }

    #[test]
    fn test_rejects_missing_intercept() {
        let x = array![[0.0, 1.0], [1.0, 1.0]];
        assert!(Dataset::new(x, array![1.0, -1.0], None).is_err());
    }

    #[test]
    fn test_rejects_bad_labels_and_weights() {
        let x = array![[1.0, 0.0], [1.0, 1.0]];
        assert!(Dataset::new(x.clone(), array![2.0, 1.0], None).is_err());
        assert!(Dataset::new(x.clone(), array![1.0], None).is_err());
        assert!(Dataset::new(x, array![1.0, -1.0], Some(array![1.0, 0.0])).is_err());
    }

    #[test]
    fn test_weights_normalized_and_class_scaled() {
        let x = array![[1.0, 0.0], [1.0, 1.0]];
        let data = Dataset::new(x, array![1.0, -1.0], Some(array![1.0, 3.0]))
            .unwrap()
            .with_class_weights(2.0, 1.0);
        assert_eq!(data.weights(), array![1.0, 1.5]);
        assert!(!data.is_unweighted());
    }
}
