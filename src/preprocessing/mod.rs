//! Preprocessing transformers for the per-model feature pipelines.
//!
//! Linear and kernel models are sensitive to feature scale and skew, so
//! their pipelines log-transform skewed columns and scale everything else
//! (z-score for the linear model, median/IQR for the kernel model).
//! Tree-based models are split-based and invariant to monotone transforms,
//! so their pipeline applies neither.
//!
//! # Example
//!
//! ```
//! use pronosticar::prelude::*;
//! use pronosticar::preprocessing::StandardScaler;
//!
//! let data = Matrix::from_vec(4, 2, vec![
//!     1.0, 100.0,
//!     2.0, 200.0,
//!     3.0, 300.0,
//!     4.0, 400.0,
//! ]).expect("valid matrix dimensions");
//!
//! let mut scaler = StandardScaler::new();
//! let scaled = scaler.fit_transform(&data).expect("fit_transform should succeed");
//! assert!(scaled.get(0, 0).abs() < 2.0);
//! ```

mod encode;
mod outlier;
mod vif;

pub use encode::{OneHotEncoder, OrdinalEncoder};
pub use outlier::{IndexMap, IqrOutlierFilter, OutlierConfig, OutlierReport};
pub use vif::{VifConfig, VifReducer, VifReport};

use crate::error::{PronosticarError, Result};
use crate::primitives::Matrix;
use crate::traits::Transformer;
use serde::{Deserialize, Serialize};

/// Standardizes features by removing mean and scaling to unit variance.
///
/// The standard score of a sample x is: z = (x - mean) / std
///
/// The fitted statistics are part of the trained-model artifact: the
/// recursive forecaster re-applies exactly these means and stds when it
/// injects raw-unit predictions into the scaled lag feature. Recomputing
/// them from any other data cut breaks that contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Mean of each feature (computed during fit).
    mean: Option<Vec<f32>>,
    /// Standard deviation of each feature (computed during fit).
    std: Option<Vec<f32>>,
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardScaler {
    /// Creates a new `StandardScaler`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mean: None,
            std: None,
        }
    }

    /// Returns the mean of each feature.
    ///
    /// # Panics
    ///
    /// Panics if the scaler is not fitted.
    #[must_use]
    pub fn mean(&self) -> &[f32] {
        self.mean
            .as_ref()
            .expect("Scaler not fitted. Call fit() first.")
    }

    /// Returns the standard deviation of each feature.
    ///
    /// # Panics
    ///
    /// Panics if the scaler is not fitted.
    #[must_use]
    pub fn std(&self) -> &[f32] {
        self.std
            .as_ref()
            .expect("Scaler not fitted. Call fit() first.")
    }

    /// Returns true if the scaler has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.mean.is_some()
    }

    /// Transforms data back to original scale.
    ///
    /// # Errors
    ///
    /// Returns an error if the scaler is not fitted or dimensions mismatch.
    pub fn inverse_transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let mean = self
            .mean
            .as_ref()
            .ok_or_else(|| PronosticarError::from("Scaler not fitted"))?;
        let std = self
            .std
            .as_ref()
            .ok_or_else(|| PronosticarError::from("Scaler not fitted"))?;

        let (n_samples, n_features) = x.shape();
        if n_features != mean.len() {
            return Err("Feature dimension mismatch".into());
        }

        let mut result = vec![0.0; n_samples * n_features];

        for i in 0..n_samples {
            for j in 0..n_features {
                let mut val = x.get(i, j);
                if std[j] > 1e-10 {
                    val *= std[j];
                }
                val += mean[j];
                result[i * n_features + j] = val;
            }
        }

        Matrix::from_vec(n_samples, n_features, result).map_err(Into::into)
    }
}

impl Transformer for StandardScaler {
    /// Computes the mean and standard deviation of each feature.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let (n_samples, n_features) = x.shape();

        if n_samples == 0 {
            return Err("Cannot fit with zero samples".into());
        }

        let mut mean = vec![0.0; n_features];
        for (j, mean_j) in mean.iter_mut().enumerate() {
            let mut sum = 0.0;
            for i in 0..n_samples {
                sum += x.get(i, j);
            }
            *mean_j = sum / n_samples as f32;
        }

        let mut std = vec![0.0; n_features];
        for (j, std_j) in std.iter_mut().enumerate() {
            let mut sum_sq = 0.0;
            for i in 0..n_samples {
                let diff = x.get(i, j) - mean[j];
                sum_sq += diff * diff;
            }
            // Population std (divide by n, not n-1) like sklearn
            *std_j = (sum_sq / n_samples as f32).sqrt();
        }

        self.mean = Some(mean);
        self.std = Some(std);

        Ok(())
    }

    /// Standardizes the data using fitted mean and std.
    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let mean = self
            .mean
            .as_ref()
            .ok_or_else(|| PronosticarError::from("Scaler not fitted"))?;
        let std = self
            .std
            .as_ref()
            .ok_or_else(|| PronosticarError::from("Scaler not fitted"))?;

        let (n_samples, n_features) = x.shape();
        if n_features != mean.len() {
            return Err("Feature dimension mismatch".into());
        }

        let mut result = vec![0.0; n_samples * n_features];

        for i in 0..n_samples {
            for j in 0..n_features {
                let mut val = x.get(i, j) - mean[j];
                if std[j] > 1e-10 {
                    val /= std[j];
                }
                result[i * n_features + j] = val;
            }
        }

        Matrix::from_vec(n_samples, n_features, result).map_err(Into::into)
    }
}

/// Scales features using statistics robust to outliers.
///
/// The transform is: z = (x - median) / IQR, with the interquartile range
/// computed per feature. Preferred over z-scoring for the kernel pipeline,
/// where the spread between micro-states and major economies would
/// otherwise let a handful of extremes dominate the scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustScaler {
    /// Median of each feature (computed during fit).
    center: Option<Vec<f32>>,
    /// Interquartile range of each feature (computed during fit).
    scale: Option<Vec<f32>>,
}

impl Default for RobustScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl RobustScaler {
    /// Creates a new `RobustScaler`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            center: None,
            scale: None,
        }
    }

    /// Returns the per-feature median.
    ///
    /// # Panics
    ///
    /// Panics if the scaler is not fitted.
    #[must_use]
    pub fn center(&self) -> &[f32] {
        self.center
            .as_ref()
            .expect("Scaler not fitted. Call fit() first.")
    }

    /// Returns the per-feature interquartile range.
    ///
    /// # Panics
    ///
    /// Panics if the scaler is not fitted.
    #[must_use]
    pub fn scale(&self) -> &[f32] {
        self.scale
            .as_ref()
            .expect("Scaler not fitted. Call fit() first.")
    }

    /// Returns true if the scaler has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.center.is_some()
    }
}

impl Transformer for RobustScaler {
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let (n_samples, n_features) = x.shape();

        if n_samples == 0 {
            return Err("Cannot fit with zero samples".into());
        }

        let mut center = vec![0.0; n_features];
        let mut scale = vec![0.0; n_features];

        for j in 0..n_features {
            let mut col: Vec<f32> = (0..n_samples).map(|i| x.get(i, j)).collect();
            col.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            center[j] = quantile_sorted(&col, 0.5);
            scale[j] = quantile_sorted(&col, 0.75) - quantile_sorted(&col, 0.25);
        }

        self.center = Some(center);
        self.scale = Some(scale);

        Ok(())
    }

    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let center = self
            .center
            .as_ref()
            .ok_or_else(|| PronosticarError::from("Scaler not fitted"))?;
        let scale = self
            .scale
            .as_ref()
            .ok_or_else(|| PronosticarError::from("Scaler not fitted"))?;

        let (n_samples, n_features) = x.shape();
        if n_features != center.len() {
            return Err("Feature dimension mismatch".into());
        }

        let mut result = vec![0.0; n_samples * n_features];

        for i in 0..n_samples {
            for j in 0..n_features {
                let mut val = x.get(i, j) - center[j];
                if scale[j] > 1e-10 {
                    val /= scale[j];
                }
                result[i * n_features + j] = val;
            }
        }

        Matrix::from_vec(n_samples, n_features, result).map_err(Into::into)
    }
}

/// Linear-interpolated quantile of a pre-sorted slice.
#[must_use]
pub(crate) fn quantile_sorted(sorted: &[f32], q: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f32;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_scaler_zero_mean_unit_std() {
        let x = Matrix::from_vec(4, 1, vec![2.0, 4.0, 6.0, 8.0]).expect("matrix");
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).expect("fit_transform");

        let col: Vec<f32> = (0..4).map(|i| scaled.get(i, 0)).collect();
        let mean: f32 = col.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
        let var: f32 = col.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
        assert!((var - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_standard_scaler_statistics_accessors() {
        let x = Matrix::from_vec(2, 2, vec![1.0, 10.0, 3.0, 30.0]).expect("matrix");
        let mut scaler = StandardScaler::new();
        scaler.fit(&x).expect("fit");
        assert!((scaler.mean()[0] - 2.0).abs() < 1e-6);
        assert!((scaler.mean()[1] - 20.0).abs() < 1e-6);
        assert!((scaler.std()[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_standard_scaler_inverse_round_trip() {
        let x =
            Matrix::from_vec(3, 2, vec![1.0, 100.0, 2.0, 200.0, 3.0, 300.0]).expect("matrix");
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).expect("fit_transform");
        let restored = scaler.inverse_transform(&scaled).expect("inverse");
        for i in 0..3 {
            for j in 0..2 {
                assert!((restored.get(i, j) - x.get(i, j)).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_standard_scaler_constant_column_untouched_by_divide() {
        let x = Matrix::from_vec(3, 1, vec![5.0, 5.0, 5.0]).expect("matrix");
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).expect("fit_transform");
        // std is 0, so only centering applies
        for i in 0..3 {
            assert!(scaled.get(i, 0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_standard_scaler_transform_before_fit_errors() {
        let scaler = StandardScaler::new();
        let x = Matrix::from_vec(1, 1, vec![1.0]).expect("matrix");
        assert!(scaler.transform(&x).is_err());
    }

    #[test]
    fn test_robust_scaler_median_iqr() {
        // Column: 1..=9 -> median 5, Q1 3, Q3 7, IQR 4
        let x = Matrix::from_vec(9, 1, (1..=9).map(|v| v as f32).collect()).expect("matrix");
        let mut scaler = RobustScaler::new();
        scaler.fit(&x).expect("fit");
        assert!((scaler.center()[0] - 5.0).abs() < 1e-6);
        assert!((scaler.scale()[0] - 4.0).abs() < 1e-6);

        let out = scaler.transform(&x).expect("transform");
        assert!((out.get(4, 0)).abs() < 1e-6); // median maps to 0
        assert!((out.get(8, 0) - 1.0).abs() < 1e-6); // 9 -> (9-5)/4
    }

    #[test]
    fn test_robust_scaler_resists_extreme_outlier() {
        let mut values: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        values.push(1.0e6);
        let x = Matrix::from_vec(10, 1, values).expect("matrix");
        let mut scaler = RobustScaler::new();
        scaler.fit(&x).expect("fit");
        // Median barely moves; the outlier does not blow up the scale
        assert!(scaler.center()[0] < 10.0);
        assert!(scaler.scale()[0] < 10.0);
    }

    #[test]
    fn test_quantile_sorted_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile_sorted(&values, 0.5) - 2.5).abs() < 1e-6);
        assert!((quantile_sorted(&values, 0.25) - 1.75).abs() < 1e-6);
        assert!((quantile_sorted(&values, 0.0) - 1.0).abs() < 1e-6);
        assert!((quantile_sorted(&values, 1.0) - 4.0).abs() < 1e-6);
    }
}
