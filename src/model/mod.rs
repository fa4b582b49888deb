//! Model training and the trained-model artifact.
//!
//! A [`ModelArtifact`] binds a fitted regressor to the feature-name
//! ordering it was trained with, its training year range, the optional
//! cluster it serves, and the scaling statistics of the lag feature. The
//! statistics are captured once, at training time, from the training
//! slice. The recursive forecaster depends on replaying exactly these
//! numbers, and every attempt to recompute them downstream from some other
//! data cut is a leakage bug.

use crate::cluster::ClusterAssignment;
use crate::data::FeatureTable;
use crate::error::{PronosticarError, Result};
use crate::linear_model::Ridge;
use crate::primitives::{Matrix, Vector};
use crate::svm::Svr;
use crate::traits::Estimator;
use crate::tree::GradientBoostingRegressor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Trend model plus a nonlinear model trained on the trend's residuals.
///
/// Both components are trained on the identical training slice and feature
/// matrix; the final prediction is trend + residual correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridRegressor {
    trend: Ridge,
    residual: GradientBoostingRegressor,
}

impl Default for HybridRegressor {
    fn default() -> Self {
        Self::new(Ridge::new(10.0), GradientBoostingRegressor::new())
    }
}

impl HybridRegressor {
    /// Creates a hybrid from an unfitted trend and residual model.
    #[must_use]
    pub fn new(trend: Ridge, residual: GradientBoostingRegressor) -> Self {
        Self { trend, residual }
    }

    /// Returns the fitted trend component.
    #[must_use]
    pub fn trend(&self) -> &Ridge {
        &self.trend
    }

    /// Returns the fitted residual component.
    #[must_use]
    pub fn residual(&self) -> &GradientBoostingRegressor {
        &self.residual
    }
}

impl Estimator for HybridRegressor {
    /// Fits trend, then the residual model on (y − trend) over the same
    /// rows.
    ///
    /// # Errors
    ///
    /// Propagates fitting errors from either component.
    fn fit(&mut self, x: &Matrix<f32>, y: &Vector<f32>) -> Result<()> {
        self.trend.fit(x, y)?;
        let trend_preds = self.trend.predict(x);
        let residuals =
            Vector::from_vec((0..y.len()).map(|i| y[i] - trend_preds[i]).collect());
        self.residual.fit(x, &residuals)
    }

    fn predict(&self, x: &Matrix<f32>) -> Vector<f32> {
        let trend = self.trend.predict(x);
        let correction = self.residual.predict(x);
        Vector::from_vec((0..trend.len()).map(|i| trend[i] + correction[i]).collect())
    }
}

/// Any of the pipeline's regressors, dispatched by variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnyRegressor {
    /// L2-regularized linear model.
    Ridge(Ridge),
    /// Epsilon-insensitive kernel regression.
    Svr(Svr),
    /// Boosted regression trees.
    GradientBoosting(GradientBoostingRegressor),
    /// Trend + residual-correction hybrid.
    Hybrid(HybridRegressor),
}

impl AnyRegressor {
    /// Short variant name for logs and reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AnyRegressor::Ridge(_) => "ridge",
            AnyRegressor::Svr(_) => "svr",
            AnyRegressor::GradientBoosting(_) => "gradient_boosting",
            AnyRegressor::Hybrid(_) => "hybrid",
        }
    }
}

impl Estimator for AnyRegressor {
    fn fit(&mut self, x: &Matrix<f32>, y: &Vector<f32>) -> Result<()> {
        match self {
            AnyRegressor::Ridge(m) => m.fit(x, y),
            AnyRegressor::Svr(m) => m.fit(x, y),
            AnyRegressor::GradientBoosting(m) => m.fit(x, y),
            AnyRegressor::Hybrid(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: &Matrix<f32>) -> Vector<f32> {
        match self {
            AnyRegressor::Ridge(m) => m.predict(x),
            AnyRegressor::Svr(m) => m.predict(x),
            AnyRegressor::GradientBoosting(m) => m.predict(x),
            AnyRegressor::Hybrid(m) => m.predict(x),
        }
    }
}

/// Training-set mean and standard deviation of an unscaled column.
///
/// Used to reproduce the lag feature's standardization when raw-unit
/// predictions are injected during recursive forecasting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TargetStats {
    /// Training-set mean of the unscaled column.
    pub mean: f32,
    /// Training-set (population) standard deviation.
    pub std: f32,
}

impl TargetStats {
    /// Applies the forward transform `(value − mean) / std`.
    #[must_use]
    pub fn scale(&self, value: f32) -> f32 {
        if self.std > 1e-10 {
            (value - self.mean) / self.std
        } else {
            value - self.mean
        }
    }

    /// Applies the inverse transform.
    #[must_use]
    pub fn unscale(&self, value: f32) -> f32 {
        if self.std > 1e-10 {
            value * self.std + self.mean
        } else {
            value + self.mean
        }
    }
}

/// A fitted regressor bound to its training context.
///
/// Immutable after training; consumed by the evaluator and the recursive
/// forecaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// The fitted regressor.
    pub model: AnyRegressor,
    /// Feature-name ordering the model expects, exactly.
    pub feature_names: Vec<String>,
    /// Inclusive training year range.
    pub train_years: (i32, i32),
    /// Cluster this model serves; None for a global model.
    pub cluster: Option<usize>,
    /// Scaling statistics of the lag feature's unscaled source column,
    /// from the training slice.
    pub lag_stats: TargetStats,
}

impl fmt::Display for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} model, {} features, trained on {}..={}",
            self.model.name(),
            self.feature_names.len(),
            self.train_years.0,
            self.train_years.1
        )?;
        if let Some(c) = self.cluster {
            write!(f, " (cluster {c})")?;
        }
        Ok(())
    }
}

impl ModelArtifact {
    /// Fails fast unless the supplied ordering matches the training one.
    ///
    /// # Errors
    ///
    /// Returns [`PronosticarError::FeatureMismatch`] on any difference;
    /// this is a programming error, not a data-quality condition.
    pub fn check_features(&self, names: &[String]) -> Result<()> {
        if names != self.feature_names.as_slice() {
            return Err(PronosticarError::FeatureMismatch {
                expected: self.feature_names.clone(),
                actual: names.to_vec(),
            });
        }
        Ok(())
    }

    /// Predicts over a feature table after the fail-fast name check.
    ///
    /// # Errors
    ///
    /// Returns an error if the table's feature ordering mismatches.
    pub fn predict_table(&self, table: &FeatureTable) -> Result<Vector<f32>> {
        self.check_features(table.feature_names())?;
        Ok(self.model.predict(table.x()))
    }

    /// Persists the artifact as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or serialization failure.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Loads an artifact previously written by [`ModelArtifact::save`].
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or deserialization failure.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Trains one global model on the chronological training slice.
///
/// The chronological split (`year < split_year`) is the only evaluation
/// protocol reported headline numbers may use; see
/// [`crate::model_selection::diagnostic_random_split`] for the
/// explicitly-labeled alternative.
///
/// # Errors
///
/// Returns an error if the training slice is empty or fitting fails.
pub fn train_chronological(
    mut model: AnyRegressor,
    table: &FeatureTable,
    split_year: i32,
    lag_stats: TargetStats,
) -> Result<ModelArtifact> {
    let (train, _) = table.split_by_year(split_year);
    if train.n_rows() == 0 {
        return Err(PronosticarError::empty_table("train_chronological"));
    }

    model.fit(train.x(), train.target())?;

    let min_year = *train.years().iter().min().expect("non-empty train slice");
    let max_year = *train.years().iter().max().expect("non-empty train slice");

    let artifact = ModelArtifact {
        model,
        feature_names: table.feature_names().to_vec(),
        train_years: (min_year, max_year),
        cluster: None,
        lag_stats,
    };
    log::info!("trained {artifact} on {} rows", train.n_rows());
    Ok(artifact)
}

/// Outcome of per-cluster training.
#[derive(Debug, Clone)]
pub struct ClusteredTrainReport {
    /// Clusters skipped for insufficient train/test rows, with row counts.
    pub skipped_clusters: Vec<(usize, usize)>,
    /// Rows whose entity has no cluster assignment.
    pub unassigned_rows: usize,
}

/// Trains one model per cluster from a shared unfitted template.
///
/// Clusters with fewer than `min_train_rows` training rows are skipped and
/// reported. Rows whose entity failed to map to any cluster are counted,
/// not fatal.
///
/// # Errors
///
/// Returns an error if no cluster could be trained.
pub fn train_per_cluster(
    template: &AnyRegressor,
    table: &FeatureTable,
    split_year: i32,
    assignment: &ClusterAssignment,
    lag_stats: TargetStats,
    min_train_rows: usize,
) -> Result<(Vec<ModelArtifact>, ClusteredTrainReport)> {
    let mut artifacts = Vec::new();
    let mut skipped = Vec::new();

    let unassigned_rows = table
        .entities()
        .iter()
        .filter(|e| assignment.get(e).is_none())
        .count();

    for cluster in 0..assignment.n_clusters() {
        let rows: Vec<usize> = (0..table.n_rows())
            .filter(|&i| assignment.get(&table.entities()[i]) == Some(cluster))
            .collect();
        let cluster_table = table.select_rows(&rows);
        let (train, _) = cluster_table.split_by_year(split_year);

        if train.n_rows() < min_train_rows {
            log::warn!(
                "cluster {cluster}: {} training rows < {min_train_rows}, skipped",
                train.n_rows()
            );
            skipped.push((cluster, train.n_rows()));
            continue;
        }

        let mut model = template.clone();
        model.fit(train.x(), train.target())?;

        let min_year = *train.years().iter().min().expect("non-empty");
        let max_year = *train.years().iter().max().expect("non-empty");
        artifacts.push(ModelArtifact {
            model,
            feature_names: table.feature_names().to_vec(),
            train_years: (min_year, max_year),
            cluster: Some(cluster),
            lag_stats,
        });
    }

    if artifacts.is_empty() {
        return Err(PronosticarError::empty_table("train_per_cluster"));
    }

    Ok((
        artifacts,
        ClusteredTrainReport {
            skipped_clusters: skipped,
            unassigned_rows,
        },
    ))
}
