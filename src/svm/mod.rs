//! Support vector regression with an RBF kernel.
//!
//! The kernel model of the pipeline. Trained on robust-scaled features:
//! the epsilon-insensitive loss and the distance-based kernel both assume
//! comparable feature scales, which raw panel covariates do not have.

use crate::error::{PronosticarError, Result};
use crate::primitives::{Matrix, Vector};
use crate::traits::Estimator;
use serde::{Deserialize, Serialize};

/// Epsilon-insensitive support vector regression.
///
/// Uses the representer form `f(x) = Σ β_j K(x_j, x) + b` with an RBF
/// kernel and minimizes
///
/// ```text
/// 1/2 βᵀKβ + C Σ max(0, |f(x_i) − y_i| − ε)
/// ```
///
/// by subgradient descent on (β, b). Residuals inside the ε-tube generate
/// no gradient, which is what stabilizes the fit.
///
/// # Examples
///
/// ```
/// use pronosticar::prelude::*;
/// use pronosticar::svm::Svr;
///
/// let x = Matrix::from_vec(5, 1, vec![0.0, 0.25, 0.5, 0.75, 1.0]).unwrap();
/// let y = Vector::from_slice(&[0.0, 0.25, 0.5, 0.75, 1.0]);
///
/// let mut model = Svr::new().with_epsilon(0.01).with_max_iter(2000);
/// model.fit(&x, &y).unwrap();
/// let pred = model.predict(&x);
/// assert!((pred[2] - 0.5).abs() < 0.2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Svr {
    /// Penalty for residuals outside the tube.
    c: f32,
    /// Half-width of the insensitive tube.
    epsilon: f32,
    /// RBF bandwidth; None selects 1 / (n_features · mean feature variance).
    gamma: Option<f32>,
    /// Subgradient step size (scaled by 1/n internally).
    learning_rate: f32,
    /// Maximum descent iterations.
    max_iter: usize,
    /// Convergence tolerance on the largest coefficient update.
    tol: f32,
    /// Training inputs retained for kernel evaluation.
    support_x: Option<Matrix<f32>>,
    /// Dual-style coefficients, parallel to the support rows.
    beta: Option<Vec<f32>>,
    /// Bias term.
    bias: f32,
    /// Resolved gamma after fitting.
    fitted_gamma: f32,
}

impl Default for Svr {
    fn default() -> Self {
        Self::new()
    }
}

impl Svr {
    /// Creates an SVR with default hyperparameters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.1,
            gamma: None,
            learning_rate: 0.1,
            max_iter: 1000,
            tol: 1e-5,
            support_x: None,
            beta: None,
            bias: 0.0,
            fitted_gamma: 1.0,
        }
    }

    /// Sets the penalty C.
    #[must_use]
    pub fn with_c(mut self, c: f32) -> Self {
        self.c = c;
        self
    }

    /// Sets the tube half-width ε.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon.max(0.0);
        self
    }

    /// Sets the RBF bandwidth γ explicitly.
    #[must_use]
    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = Some(gamma);
        self
    }

    /// Sets the descent step size.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the iteration budget.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the convergence tolerance.
    #[must_use]
    pub fn with_tol(mut self, tol: f32) -> Self {
        self.tol = tol;
        self
    }

    /// Returns true if the model has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.beta.is_some()
    }

    /// Number of support rows with non-negligible coefficients.
    ///
    /// # Panics
    ///
    /// Panics if model is not fitted.
    #[must_use]
    pub fn n_support(&self) -> usize {
        self.beta
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
            .iter()
            .filter(|b| b.abs() > 1e-8)
            .count()
    }

    fn rbf(gamma: f32, a: &Matrix<f32>, i: usize, b: &Matrix<f32>, j: usize) -> f32 {
        let mut dist = 0.0;
        for k in 0..a.n_cols() {
            let d = a.get(i, k) - b.get(j, k);
            dist += d * d;
        }
        (-gamma * dist).exp()
    }

    fn resolve_gamma(&self, x: &Matrix<f32>) -> f32 {
        if let Some(g) = self.gamma {
            return g;
        }
        // sklearn-style "scale": 1 / (n_features * mean feature variance)
        let (n, p) = x.shape();
        let mut total_var = 0.0;
        for j in 0..p {
            let col: Vec<f32> = (0..n).map(|i| x.get(i, j)).collect();
            let mean: f32 = col.iter().sum::<f32>() / n as f32;
            total_var += col.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n as f32;
        }
        let mean_var = total_var / p as f32;
        if mean_var > 1e-10 {
            1.0 / (p as f32 * mean_var)
        } else {
            1.0
        }
    }
}

impl Estimator for Svr {
    /// Fits by subgradient descent on the regularized tube loss.
    ///
    /// # Errors
    ///
    /// Returns an error on dimension mismatch or empty input.
    fn fit(&mut self, x: &Matrix<f32>, y: &Vector<f32>) -> Result<()> {
        let (n, _) = x.shape();
        if n != y.len() {
            return Err(PronosticarError::DimensionMismatch {
                expected: format!("{n} targets"),
                actual: format!("{}", y.len()),
            });
        }
        if n == 0 {
            return Err(PronosticarError::empty_table("svr_fit"));
        }

        let gamma = self.resolve_gamma(x);

        // Precompute the kernel Gram matrix (n is a few thousand at most)
        let mut k = vec![0.0f32; n * n];
        for i in 0..n {
            for j in i..n {
                let v = Self::rbf(gamma, x, i, x, j);
                k[i * n + j] = v;
                k[j * n + i] = v;
            }
        }

        let mut beta = vec![0.0f32; n];
        let mut bias = y.mean();
        let step = self.learning_rate / n as f32;

        for _ in 0..self.max_iter {
            // f = Kβ + b
            let mut f = vec![bias; n];
            for i in 0..n {
                let mut acc = 0.0;
                for j in 0..n {
                    acc += k[i * n + j] * beta[j];
                }
                f[i] += acc;
            }

            // Subgradient of the tube loss per sample
            let l: Vec<f32> = (0..n)
                .map(|i| {
                    let r = f[i] - y[i];
                    if r > self.epsilon {
                        1.0
                    } else if r < -self.epsilon {
                        -1.0
                    } else {
                        0.0
                    }
                })
                .collect();

            let mut max_delta = 0.0f32;
            for m in 0..n {
                // loss term C Σ_i l_i K_im
                let mut grad = 0.0;
                for i in 0..n {
                    grad += k[m * n + i] * self.c * l[i];
                }
                // regularizer (Kβ)_m, already available as f_m − b
                grad += f[m] - bias;
                let delta = step * grad;
                beta[m] -= delta;
                max_delta = max_delta.max(delta.abs());
            }

            let bias_grad: f32 = self.c * l.iter().sum::<f32>();
            bias -= step * bias_grad;

            if max_delta < self.tol {
                break;
            }
        }

        self.fitted_gamma = gamma;
        self.support_x = Some(x.clone());
        self.beta = Some(beta);
        self.bias = bias;
        Ok(())
    }

    /// Predicts via the kernel expansion over the support rows.
    ///
    /// # Panics
    ///
    /// Panics if model is not fitted or feature counts differ.
    fn predict(&self, x: &Matrix<f32>) -> Vector<f32> {
        let support = self
            .support_x
            .as_ref()
            .expect("Model not fitted. Call fit() first.");
        let beta = self.beta.as_ref().expect("Model not fitted.");
        assert_eq!(
            x.n_cols(),
            support.n_cols(),
            "Feature count must match training data"
        );

        let preds: Vec<f32> = (0..x.n_rows())
            .map(|i| {
                let mut acc = self.bias;
                for (j, b) in beta.iter().enumerate() {
                    if b.abs() > 1e-12 {
                        acc += b * Self::rbf(self.fitted_gamma, x, i, support, j);
                    }
                }
                acc
            })
            .collect();

        Vector::from_vec(preds)
    }
}
