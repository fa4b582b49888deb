//! Multi-step forecasting: recursive lag propagation and teacher forcing.
//!
//! The recursive forecaster walks the held-out years in strict ascending
//! order. Each year's predictions are fully computed before anything is
//! written into the next year's rows: the lag injection is a sequential
//! dependency, and the year loop must never be reordered or parallelized
//! without materializing year t's outputs first.
//!
//! Scale contract: the lag feature was standardized with training-set
//! statistics of its unscaled source column, so a raw-unit prediction is
//! injected as `(pred − mean) / std` using exactly those statistics,
//! which live in the [`ModelArtifact`]. Teacher forcing applies the same
//! models to the true historical lags instead and serves as the
//! upper-bound baseline recursive degradation is measured against.

use crate::cluster::ClusterAssignment;
use crate::data::FeatureTable;
use crate::error::{PronosticarError, Result};
use crate::metrics::{self, MacroMape};
use crate::model::{ModelArtifact, TargetStats};
use crate::primitives::Vector;
use crate::traits::Estimator;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// The models driving a forecast: one global, or one per cluster.
#[derive(Debug, Clone)]
pub enum ModelSet {
    /// A single model for every entity.
    Global(ModelArtifact),
    /// Per-cluster models plus the static assignment that routes entities.
    Clustered {
        /// One artifact per trained cluster.
        models: Vec<ModelArtifact>,
        /// Entity → cluster routing, computed from training years only.
        assignment: ClusterAssignment,
    },
}

impl ModelSet {
    /// Lag scaling statistics shared by the set.
    ///
    /// # Panics
    ///
    /// Panics if a clustered set is empty (construction prevents this).
    #[must_use]
    pub fn lag_stats(&self) -> TargetStats {
        match self {
            ModelSet::Global(artifact) => artifact.lag_stats,
            ModelSet::Clustered { models, .. } => {
                models.first().expect("clustered set is non-empty").lag_stats
            }
        }
    }

    /// Fails fast unless every artifact expects the given feature order.
    ///
    /// # Errors
    ///
    /// Returns a feature-mismatch error on any difference.
    pub fn check_features(&self, names: &[String]) -> Result<()> {
        match self {
            ModelSet::Global(artifact) => artifact.check_features(names),
            ModelSet::Clustered { models, .. } => {
                for artifact in models {
                    artifact.check_features(names)?;
                }
                Ok(())
            }
        }
    }

    /// The artifact serving an entity, if any.
    #[must_use]
    pub fn artifact_for(&self, entity: &str) -> Option<&ModelArtifact> {
        match self {
            ModelSet::Global(artifact) => Some(artifact),
            ModelSet::Clustered { models, assignment } => {
                let cluster = assignment.get(entity)?;
                models.iter().find(|m| m.cluster == Some(cluster))
            }
        }
    }
}

/// Paired (entity, year, actual, prediction) rows for the evaluator.
#[derive(Debug, Clone)]
pub struct PredictionTable {
    entities: Vec<String>,
    years: Vec<i32>,
    actual: Vector<f32>,
    predicted: Vector<f32>,
}

impl PredictionTable {
    /// Number of predicted rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if nothing was predicted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity of each prediction.
    #[must_use]
    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    /// Year of each prediction.
    #[must_use]
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    /// Actual target values.
    #[must_use]
    pub fn actual(&self) -> &Vector<f32> {
        &self.actual
    }

    /// Predicted target values.
    #[must_use]
    pub fn predicted(&self) -> &Vector<f32> {
        &self.predicted
    }

    /// R² of the predictions.
    #[must_use]
    pub fn r_squared(&self) -> f32 {
        metrics::r_squared(&self.predicted, &self.actual)
    }

    /// RMSE of the predictions.
    #[must_use]
    pub fn rmse(&self) -> f32 {
        metrics::rmse(&self.predicted, &self.actual)
    }

    /// Macro-averaged MAPE of the predictions.
    #[must_use]
    pub fn macro_mape(&self, epsilon: f32) -> MacroMape {
        metrics::macro_mape(&self.predicted, &self.actual, &self.entities, epsilon)
    }

    /// Writes `{entity, year, actual, prediction}` rows as CSV.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(["entity", "year", "actual", "prediction"])?;
        for i in 0..self.len() {
            writer.write_record([
                self.entities[i].clone(),
                self.years[i].to_string(),
                self.actual[i].to_string(),
                self.predicted[i].to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// What happened during a forecast pass.
#[derive(Debug, Clone)]
pub struct ForecastReport {
    /// Forecast years in the order walked.
    pub years: Vec<i32>,
    /// Predictions written into a next-year lag cell.
    pub propagated: usize,
    /// Entities present at year t with no row at t+1 (attrition no-ops).
    pub missed_propagations: usize,
    /// Rows skipped because no model serves their entity.
    pub skipped_rows: usize,
}

impl fmt::Display for ForecastReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} years, {} lags propagated, {} propagation misses, {} rows without a model",
            self.years.len(),
            self.propagated,
            self.missed_propagations,
            self.skipped_rows
        )
    }
}

/// Multi-step-ahead forecaster over a held-out feature table.
#[derive(Debug, Clone)]
pub struct RecursiveForecaster {
    lag_feature: String,
}

impl RecursiveForecaster {
    /// Creates a forecaster that propagates into the named lag column.
    #[must_use]
    pub fn new(lag_feature: &str) -> Self {
        Self {
            lag_feature: lag_feature.to_string(),
        }
    }

    /// Recursive multi-step forecast: each year's predictions become the
    /// next year's lag inputs.
    ///
    /// The first forecast year uses true historical lags; every later year
    /// uses propagated predictions. The final year's prediction is
    /// recorded but has nowhere to propagate.
    ///
    /// # Errors
    ///
    /// Returns an error if the lag column is missing, the feature ordering
    /// mismatches any model, or the table is empty.
    pub fn forecast(
        &self,
        models: &ModelSet,
        test: &FeatureTable,
    ) -> Result<(PredictionTable, ForecastReport)> {
        self.run(models, test, true)
    }

    /// Teacher forcing: the same models applied with true historical lags
    /// at every year. No mutation, no propagation.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`RecursiveForecaster::forecast`].
    pub fn teacher_forcing(
        &self,
        models: &ModelSet,
        test: &FeatureTable,
    ) -> Result<(PredictionTable, ForecastReport)> {
        self.run(models, test, false)
    }

    fn run(
        &self,
        models: &ModelSet,
        test: &FeatureTable,
        propagate: bool,
    ) -> Result<(PredictionTable, ForecastReport)> {
        if test.n_rows() == 0 {
            return Err(PronosticarError::empty_table("forecast"));
        }
        models.check_features(test.feature_names())?;
        let lag_idx = test
            .feature_index(&self.lag_feature)
            .ok_or_else(|| PronosticarError::missing_column(&self.lag_feature))?;

        let stats = models.lag_stats();
        let mut working = test.clone();
        let lookup = working.row_lookup();
        let years = working.distinct_years();
        let last_year = *years.last().expect("non-empty table has years");

        let mut predictions: Vec<Option<f32>> = vec![None; working.n_rows()];
        let mut propagated = 0;
        let mut missed = 0;
        let mut skipped = 0;

        for &year in &years {
            let rows = working.rows_at_year(year);

            // Group the year's rows by the artifact that serves them
            let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
            for &row in &rows {
                match models.artifact_for(&working.entities()[row]) {
                    Some(artifact) => {
                        let key = artifact.cluster.map_or(usize::MAX, |c| c);
                        groups.entry(key).or_default().push(row);
                    }
                    None => skipped += 1,
                }
            }

            for (key, group_rows) in &groups {
                let artifact = if *key == usize::MAX {
                    match models {
                        ModelSet::Global(a) => a,
                        ModelSet::Clustered { .. } => unreachable!("global key in clustered set"),
                    }
                } else {
                    match models {
                        ModelSet::Clustered { models: m, .. } => m
                            .iter()
                            .find(|a| a.cluster == Some(*key))
                            .expect("grouped by existing artifact"),
                        ModelSet::Global(_) => unreachable!("cluster key in global set"),
                    }
                };

                let x_sub = working.x().select_rows(group_rows);
                let preds = artifact.model.predict(&x_sub);

                for (slot, &row) in group_rows.iter().enumerate() {
                    predictions[row] = Some(preds[slot]);
                }
            }

            if !propagate || year == last_year {
                continue; // terminal year: recorded, not propagated
            }

            for &row in &rows {
                let Some(pred) = predictions[row] else {
                    continue; // skipped row, nothing to feed forward
                };
                let entity = working.entities()[row].clone();
                match lookup.get(&(entity, year + 1)) {
                    Some(&next_row) => {
                        working.set_value(next_row, lag_idx, stats.scale(pred));
                        propagated += 1;
                    }
                    None => missed += 1,
                }
            }
        }

        let kept: Vec<usize> = (0..working.n_rows())
            .filter(|&i| predictions[i].is_some())
            .collect();
        if kept.is_empty() {
            return Err(PronosticarError::empty_table("forecast_predictions"));
        }

        let table = PredictionTable {
            entities: kept.iter().map(|&i| working.entities()[i].clone()).collect(),
            years: kept.iter().map(|&i| working.years()[i]).collect(),
            actual: Vector::from_vec(kept.iter().map(|&i| working.target()[i]).collect()),
            predicted: Vector::from_vec(
                kept.iter()
                    .map(|&i| predictions[i].expect("kept rows are predicted"))
                    .collect(),
            ),
        };

        let report = ForecastReport {
            years,
            propagated,
            missed_propagations: missed,
            skipped_rows: skipped,
        };
        log::info!(
            "{} forecast: {report}",
            if propagate { "recursive" } else { "teacher-forcing" }
        );

        Ok((table, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_model::Ridge;
    use crate::model::AnyRegressor;
    use crate::primitives::Matrix;

    /// A Ridge model fitted so prediction = `coef` * lag + 0 exactly.
    fn lag_model(coef: f32, stats: TargetStats) -> ModelArtifact {
        // Train y = coef * lag on exact data, alpha = 0 -> exact recovery
        let x = Matrix::from_vec(3, 1, vec![0.0, 1.0, 2.0]).expect("matrix");
        let y = Vector::from_vec(vec![0.0, coef, 2.0 * coef]);
        let mut model = Ridge::new(0.0);
        model.fit(&x, &y).expect("fit");

        ModelArtifact {
            model: AnyRegressor::Ridge(model),
            feature_names: vec!["co2_lag1".to_string()],
            train_years: (2000, 2014),
            cluster: None,
            lag_stats: stats,
        }
    }

    fn test_table(entities: &[(&str, i32, f32, f32)]) -> FeatureTable {
        // (entity, year, lag_value, actual)
        let n = entities.len();
        FeatureTable::new(
            (0..n as u64).collect(),
            entities.iter().map(|(e, ..)| (*e).to_string()).collect(),
            entities.iter().map(|&(_, y, ..)| y).collect(),
            vec!["co2_lag1".to_string()],
            vec![false],
            Matrix::from_vec(n, 1, entities.iter().map(|&(_, _, l, _)| l).collect())
                .expect("matrix"),
            Vector::from_vec(entities.iter().map(|&(_, _, _, a)| a).collect()),
        )
        .expect("table")
    }

    #[test]
    fn test_propagated_lag_is_exactly_scaled_prediction() {
        // Two entities, three years. Model: pred = 2 * lag.
        // Lag scaling: mean 5, std 2.
        let stats = TargetStats { mean: 5.0, std: 2.0 };
        let models = ModelSet::Global(lag_model(2.0, stats));

        let table = test_table(&[
            ("A", 2015, 4.0, 0.0),
            ("A", 2016, 99.0, 0.0), // placeholder lag, must be overwritten
            ("A", 2017, 99.0, 0.0),
            ("B", 2015, 6.0, 0.0),
            ("B", 2016, 99.0, 0.0),
            ("B", 2017, 99.0, 0.0),
        ]);

        let forecaster = RecursiveForecaster::new("co2_lag1");
        let (preds, report) = forecaster.forecast(&models, &table).expect("forecast");

        // Year-by-year closed form for entity A:
        //   p2015 = 2 * 4.0 = 8.0
        //   lag2016 = (8.0 - 5.0) / 2.0 = 1.5  (the documented transform)
        //   p2016 = 2 * 1.5 = 3.0
        //   lag2017 = (3.0 - 5.0) / 2.0 = -1.0
        //   p2017 = -2.0
        let by_key: std::collections::HashMap<(String, i32), f32> = preds
            .entities()
            .iter()
            .zip(preds.years())
            .zip(preds.predicted().as_slice())
            .map(|((e, &y), &p)| ((e.clone(), y), p))
            .collect();

        assert!((by_key[&("A".to_string(), 2015)] - 8.0).abs() < 1e-4);
        assert!((by_key[&("A".to_string(), 2016)] - 3.0).abs() < 1e-4);
        assert!((by_key[&("A".to_string(), 2017)] - (-2.0)).abs() < 1e-4);

        // Every non-terminal prediction propagated, none missed
        assert_eq!(report.propagated, 4);
        assert_eq!(report.missed_propagations, 0);
        assert_eq!(report.years, vec![2015, 2016, 2017]);
    }

    #[test]
    fn test_teacher_forcing_keeps_true_lags() {
        let stats = TargetStats { mean: 0.0, std: 1.0 };
        let models = ModelSet::Global(lag_model(2.0, stats));

        let table = test_table(&[
            ("A", 2015, 4.0, 0.0),
            ("A", 2016, 7.0, 0.0), // true historical lag, must be used as-is
        ]);

        let forecaster = RecursiveForecaster::new("co2_lag1");
        let (preds, report) = forecaster.teacher_forcing(&models, &table).expect("tf");

        assert!((preds.predicted()[0] - 8.0).abs() < 1e-4);
        assert!((preds.predicted()[1] - 14.0).abs() < 1e-4);
        assert_eq!(report.propagated, 0);
        assert_eq!(report.missed_propagations, 0);
    }

    #[test]
    fn test_attrited_entity_is_counted_not_fatal() {
        let stats = TargetStats { mean: 0.0, std: 1.0 };
        let models = ModelSet::Global(lag_model(1.0, stats));

        // B exists in 2015 but not 2016: its propagation is a no-op
        let table = test_table(&[
            ("A", 2015, 1.0, 0.0),
            ("A", 2016, 9.0, 0.0),
            ("B", 2015, 2.0, 0.0),
        ]);

        let forecaster = RecursiveForecaster::new("co2_lag1");
        let (_, report) = forecaster.forecast(&models, &table).expect("forecast");
        assert_eq!(report.propagated, 1);
        assert_eq!(report.missed_propagations, 1);
    }

    #[test]
    fn test_missing_lag_column_errors() {
        let stats = TargetStats { mean: 0.0, std: 1.0 };
        let models = ModelSet::Global(lag_model(1.0, stats));
        let table = test_table(&[("A", 2015, 1.0, 0.0)]);

        let forecaster = RecursiveForecaster::new("nonexistent_lag");
        assert!(matches!(
            forecaster.forecast(&models, &table),
            Err(PronosticarError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_feature_mismatch_fails_fast() {
        let stats = TargetStats { mean: 0.0, std: 1.0 };
        let mut artifact = lag_model(1.0, stats);
        artifact.feature_names = vec!["something_else".to_string()];
        let models = ModelSet::Global(artifact);
        let table = test_table(&[("A", 2015, 1.0, 0.0)]);

        let forecaster = RecursiveForecaster::new("co2_lag1");
        assert!(matches!(
            forecaster.forecast(&models, &table),
            Err(PronosticarError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn test_prediction_table_save_csv() {
        let stats = TargetStats { mean: 0.0, std: 1.0 };
        let models = ModelSet::Global(lag_model(2.0, stats));
        let table = test_table(&[("A", 2015, 4.0, 8.5)]);

        let forecaster = RecursiveForecaster::new("co2_lag1");
        let (preds, _) = forecaster.forecast(&models, &table).expect("forecast");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("predictions.csv");
        preds.save_csv(&path).expect("save");
        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.starts_with("entity,year,actual,prediction"));
        assert!(text.contains("A,2015,8.5,8"));
    }
}
