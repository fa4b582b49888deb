//! Core traits for estimators and transformers.
//!
//! These traits define the API contracts shared by the regressors and the
//! preprocessing stages of the forecasting pipeline.

use crate::error::Result;
use crate::primitives::{Matrix, Vector};

/// Primary trait for supervised regressors.
///
/// Estimators implement fit/predict/score following sklearn conventions.
///
/// # Examples
///
/// ```
/// use pronosticar::prelude::*;
///
/// // Training data: y = 2x + 1
/// let x_train = Matrix::from_vec(4, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// let y_train = Vector::from_slice(&[3.0, 5.0, 7.0, 9.0]);
///
/// let mut model = Ridge::new(0.0);
/// model.fit(&x_train, &y_train).unwrap();
/// let score = model.score(&x_train, &y_train);
/// assert!(score > 0.99);
/// ```
pub trait Estimator {
    /// Fits the model to training data.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails (dimension mismatch, singular
    /// matrix, failure to converge).
    fn fit(&mut self, x: &Matrix<f32>, y: &Vector<f32>) -> Result<()>;

    /// Predicts target values for input data.
    fn predict(&self, x: &Matrix<f32>) -> Vector<f32>;

    /// Computes the R² score on the supplied data.
    fn score(&self, x: &Matrix<f32>, y: &Vector<f32>) -> f32 {
        let y_pred = self.predict(x);
        crate::metrics::r_squared(&y_pred, y)
    }
}

/// Trait for unsupervised models (clustering).
pub trait UnsupervisedEstimator {
    /// The type of labels/clusters produced.
    type Labels;

    /// Fits the model to data.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails (empty data, invalid parameters).
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()>;

    /// Predicts cluster assignments.
    fn predict(&self, x: &Matrix<f32>) -> Self::Labels;
}

/// Trait for data transformers (scalers, encoders).
///
/// Statistics captured during `fit` are part of the trained artifact: a
/// transformer fitted on the training slice must be reused as-is on test
/// rows and inside the recursive forecasting loop, never refitted.
pub trait Transformer {
    /// Fits the transformer to data.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()>;

    /// Transforms data using fitted parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the transformer is not fitted.
    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>>;

    /// Fits and transforms in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails.
    fn fit_transform(&mut self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        self.fit(x)?;
        self.transform(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PronosticarError;

    struct HalfScaler {
        fitted: bool,
    }

    impl Transformer for HalfScaler {
        fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
            if x.n_rows() == 0 {
                return Err(PronosticarError::empty_table("half_scaler"));
            }
            self.fitted = true;
            Ok(())
        }

        fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
            if !self.fitted {
                return Err("HalfScaler not fitted".into());
            }
            let (rows, cols) = x.shape();
            let data: Vec<f32> = x.as_slice().iter().map(|v| v / 2.0).collect();
            Matrix::from_vec(rows, cols, data).map_err(Into::into)
        }
    }

    #[test]
    fn test_fit_transform_default_impl() {
        let mut t = HalfScaler { fitted: false };
        let x = Matrix::from_vec(2, 2, vec![2.0, 4.0, 6.0, 8.0]).expect("matrix");
        let out = t.fit_transform(&x).expect("fit_transform");
        assert!((out.get(0, 0) - 1.0).abs() < f32::EPSILON);
        assert!((out.get(1, 1) - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_transform_without_fit_errors() {
        let t = HalfScaler { fitted: false };
        let x = Matrix::from_vec(1, 1, vec![1.0]).expect("matrix");
        assert!(t.transform(&x).is_err());
    }

    #[test]
    fn test_fit_empty_errors() {
        let mut t = HalfScaler { fitted: false };
        let x = Matrix::from_vec(0, 2, vec![]).expect("matrix");
        assert!(t.fit_transform(&x).is_err());
    }
}
