//! Gradient Boosting Regressor.
//!
//! Squared-error gradient boosting with regression trees as weak learners.

use super::DecisionTreeRegressor;
use crate::error::{PronosticarError, Result};
use crate::primitives::{Matrix, Vector};
use crate::traits::Estimator;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Gradient Boosting Regressor.
///
/// # Algorithm
///
/// 1. Initialize with the mean of the training target
/// 2. For each boosting iteration:
///    - Compute residuals (negative gradient of squared error)
///    - Fit a shallow regression tree to the residuals, optionally on a
///      row subsample
///    - Update predictions with `learning_rate` * tree prediction
/// 3. Final prediction = init + `learning_rate` * Σ tree predictions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    /// Number of boosting iterations (trees)
    n_estimators: usize,
    /// Learning rate (shrinkage parameter)
    learning_rate: f32,
    /// Maximum depth of each tree
    max_depth: usize,
    /// Fraction of rows drawn (without replacement) per iteration
    subsample: f32,
    /// Seed for the subsampling RNG
    random_state: Option<u64>,
    /// Initial prediction (training target mean)
    init_prediction: f32,
    /// Ensemble of fitted trees
    estimators: Vec<DecisionTreeRegressor>,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl GradientBoostingRegressor {
    /// Creates a regressor with default parameters.
    ///
    /// # Default Parameters
    ///
    /// - `n_estimators`: 100
    /// - `learning_rate`: 0.1
    /// - `max_depth`: 3
    /// - `subsample`: 1.0
    #[must_use]
    pub fn new() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            subsample: 1.0,
            random_state: None,
            init_prediction: 0.0,
            estimators: Vec::new(),
        }
    }

    /// Sets the number of boosting iterations.
    #[must_use]
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// Sets the learning rate (shrinkage parameter).
    ///
    /// Lower values require more trees but often generalize better.
    /// Typical values: 0.01 - 0.3
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the maximum depth of each tree.
    ///
    /// Smaller depths prevent overfitting. Typical values: 2-5
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the per-iteration row subsampling fraction in (0, 1].
    #[must_use]
    pub fn with_subsample(mut self, subsample: f32) -> Self {
        self.subsample = subsample.clamp(0.05, 1.0);
        self
    }

    /// Sets the subsampling seed for reproducible fits.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Returns the number of fitted trees.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.estimators.len()
    }

    /// Returns true if the ensemble has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        !self.estimators.is_empty()
    }
}

impl Estimator for GradientBoostingRegressor {
    /// Trains the boosted ensemble on squared-error residuals.
    ///
    /// # Errors
    ///
    /// Returns an error on empty input or dimension mismatch.
    fn fit(&mut self, x: &Matrix<f32>, y: &Vector<f32>) -> Result<()> {
        let n_samples = x.n_rows();
        if n_samples != y.len() {
            return Err(PronosticarError::DimensionMismatch {
                expected: format!("{n_samples} targets"),
                actual: format!("{}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(PronosticarError::empty_table("gbm_fit"));
        }

        self.init_prediction = y.mean();
        let mut raw_predictions = vec![self.init_prediction; n_samples];
        self.estimators = Vec::with_capacity(self.n_estimators);

        let mut rng = StdRng::seed_from_u64(self.random_state.unwrap_or(0));
        let sample_size = ((n_samples as f32 * self.subsample).round() as usize)
            .clamp(1, n_samples);

        for _ in 0..self.n_estimators {
            let residuals: Vec<f32> = (0..n_samples)
                .map(|i| y[i] - raw_predictions[i])
                .collect();

            // Row subsample without replacement (partial Fisher-Yates)
            let rows: Vec<usize> = if sample_size < n_samples {
                let mut pool: Vec<usize> = (0..n_samples).collect();
                for i in 0..sample_size {
                    let j = rng.random_range(i..n_samples);
                    pool.swap(i, j);
                }
                pool.truncate(sample_size);
                pool
            } else {
                (0..n_samples).collect()
            };

            let x_sub = x.select_rows(&rows);
            let r_sub = Vector::from_vec(rows.iter().map(|&i| residuals[i]).collect());

            let mut tree = DecisionTreeRegressor::new().with_max_depth(self.max_depth);
            tree.fit(&x_sub, &r_sub)?;

            let tree_preds = tree.predict(x);
            for i in 0..n_samples {
                raw_predictions[i] += self.learning_rate * tree_preds[i];
            }

            self.estimators.push(tree);
        }

        Ok(())
    }

    /// Predicts by summing the shrunken tree outputs.
    ///
    /// # Panics
    ///
    /// Panics if the model has not been fitted.
    fn predict(&self, x: &Matrix<f32>) -> Vector<f32> {
        assert!(!self.estimators.is_empty(), "Model not fitted. Call fit() first.");

        let n_samples = x.n_rows();
        let mut raw = vec![self.init_prediction; n_samples];

        for tree in &self.estimators {
            let tree_preds = tree.predict(x);
            for i in 0..n_samples {
                raw[i] += self.learning_rate * tree_preds[i];
            }
        }

        Vector::from_vec(raw)
    }
}
