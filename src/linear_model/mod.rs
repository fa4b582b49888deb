//! Linear models for regression.
//!
//! Includes L2-regularized (Ridge) regression, the trend model of the
//! forecasting pipeline.

use crate::error::{PronosticarError, Result};
use crate::primitives::{Matrix, Vector};
use crate::traits::Estimator;
use serde::{Deserialize, Serialize};

/// Ridge regression (L2-regularized least squares).
///
/// Minimizes `||y - Xβ||² + α ||β||²`, with the intercept left
/// unpenalized. The model equation is:
///
/// ```text
/// y = X β + ε
/// ```
///
/// # Solver
///
/// Normal equations with a regularized Gram matrix,
/// `β = (X^T X + α I)^-1 X^T y`, solved via Cholesky decomposition. The
/// α on the diagonal also conditions the one-hot-heavy design matrices the
/// linear pipeline produces, which plain OLS would reject as singular.
///
/// # Examples
///
/// ```
/// use pronosticar::prelude::*;
///
/// // y = 2x + 1
/// let x = Matrix::from_vec(4, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// let y = Vector::from_slice(&[3.0, 5.0, 7.0, 9.0]);
///
/// let mut model = Ridge::new(0.1);
/// model.fit(&x, &y).unwrap();
/// assert!(model.score(&x, &y) > 0.99);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ridge {
    /// Regularization strength α (>= 0).
    alpha: f32,
    /// Coefficients for features (excluding intercept).
    coefficients: Option<Vector<f32>>,
    /// Intercept (bias) term.
    intercept: f32,
    /// Whether to fit an intercept.
    fit_intercept: bool,
}

impl Default for Ridge {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Ridge {
    /// Creates a Ridge model with the given regularization strength.
    ///
    /// α = 0 reduces to ordinary least squares.
    #[must_use]
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.max(0.0),
            coefficients: None,
            intercept: 0.0,
            fit_intercept: true,
        }
    }

    /// Sets whether to fit an intercept term.
    #[must_use]
    pub fn with_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    /// Returns the regularization strength.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Returns the coefficients (excluding intercept).
    ///
    /// # Panics
    ///
    /// Panics if model is not fitted.
    #[must_use]
    pub fn coefficients(&self) -> &Vector<f32> {
        self.coefficients
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Returns the intercept term.
    #[must_use]
    pub fn intercept(&self) -> f32 {
        self.intercept
    }

    /// Returns true if the model has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    /// Adds an intercept column of ones to the design matrix.
    fn add_intercept_column(x: &Matrix<f32>) -> Matrix<f32> {
        let (n_rows, n_cols) = x.shape();
        let mut data = Vec::with_capacity(n_rows * (n_cols + 1));

        for i in 0..n_rows {
            data.push(1.0);
            for j in 0..n_cols {
                data.push(x.get(i, j));
            }
        }

        Matrix::from_vec(n_rows, n_cols + 1, data)
            .expect("Internal error: failed to create design matrix")
    }
}

impl Estimator for Ridge {
    /// Fits the model by solving the regularized normal equations.
    ///
    /// # Errors
    ///
    /// Returns an error if input dimensions don't match, the input is
    /// empty, or the regularized Gram matrix is not positive definite
    /// (only possible with α = 0 and collinear features).
    fn fit(&mut self, x: &Matrix<f32>, y: &Vector<f32>) -> Result<()> {
        let (n_samples, n_features) = x.shape();

        if n_samples != y.len() {
            return Err(PronosticarError::DimensionMismatch {
                expected: format!("{n_samples} targets"),
                actual: format!("{}", y.len()),
            });
        }

        if n_samples == 0 {
            return Err(PronosticarError::empty_table("ridge_fit"));
        }

        let x_design = if self.fit_intercept {
            Self::add_intercept_column(x)
        } else {
            x.clone()
        };

        let xt = x_design.transpose();
        let mut xtx = xt
            .matmul(&x_design)
            .map_err(PronosticarError::from)?;

        // Penalize every coefficient except the intercept
        let offset = usize::from(self.fit_intercept);
        for j in offset..xtx.n_rows() {
            let d = xtx.get(j, j);
            xtx.set(j, j, d + self.alpha);
        }

        let xty = xt.matvec(y).map_err(PronosticarError::from)?;

        let beta = xtx
            .cholesky_solve(&xty)
            .map_err(|_| PronosticarError::SingularMatrix {
                context: "ridge".to_string(),
            })?;

        if self.fit_intercept {
            self.intercept = beta[0];
            self.coefficients = Some(beta.slice(1, n_features + 1));
        } else {
            self.intercept = 0.0;
            self.coefficients = Some(beta);
        }

        Ok(())
    }

    /// Predicts target values for input data.
    ///
    /// # Panics
    ///
    /// Panics if model is not fitted or feature counts differ.
    fn predict(&self, x: &Matrix<f32>) -> Vector<f32> {
        let coefficients = self
            .coefficients
            .as_ref()
            .expect("Model not fitted. Call fit() first.");

        let result = x
            .matvec(coefficients)
            .expect("Matrix dimensions don't match coefficients");

        result.add_scalar(self.intercept)
    }
}
