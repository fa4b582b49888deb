//! Iterative multicollinearity reduction by variance inflation factor.
//!
//! VIF_j = 1 / (1 − R²_j), where R²_j comes from regressing feature j on
//! the other candidate features. Features are removed one at a time, worst
//! first, until nothing exceeds the threshold or fewer than two candidates
//! remain. The autoregressive lag of the target is intentionally collinear
//! with the energy/GDP covariates and indispensable for forecasting, so it
//! is protected: never a candidate, never dropped.
//!
//! Cost is O(iterations × features × regression), fine for panel tables of
//! a few thousand rows. Call it once per pipeline, not inside any per-row
//! or per-model loop.

use crate::data::FeatureTable;
use crate::error::{PronosticarError, Result};
use crate::metrics::r_squared;
use crate::primitives::{Matrix, Vector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for [`VifReducer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VifConfig {
    /// Features with VIF above this are dropped (default 10).
    pub threshold: f32,
    /// Feature names exempt from consideration, notably the target's lag.
    pub protected: Vec<String>,
}

impl Default for VifConfig {
    fn default() -> Self {
        Self {
            threshold: 10.0,
            protected: Vec::new(),
        }
    }
}

impl VifConfig {
    /// Sets the VIF threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Replaces the protected feature list.
    #[must_use]
    pub fn with_protected<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Outcome of a VIF reduction pass.
#[derive(Debug, Clone)]
pub struct VifReport {
    /// Dropped features with the VIF that condemned them, in drop order.
    pub dropped: Vec<(String, f32)>,
    /// Set when a numerical failure aborted the loop at the current
    /// feature set instead of producing wrong VIFs.
    pub aborted: Option<String>,
}

impl fmt::Display for VifReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dropped {} features", self.dropped.len())?;
        if let Some(reason) = &self.aborted {
            write!(f, " (aborted early: {reason})")?;
        }
        Ok(())
    }
}

/// Iterative VIF-based feature reducer.
#[derive(Debug, Clone, Default)]
pub struct VifReducer {
    config: VifConfig,
}

impl VifReducer {
    /// Creates a reducer with the given configuration.
    #[must_use]
    pub fn new(config: VifConfig) -> Self {
        Self { config }
    }

    /// Removes multicollinear features from the table.
    ///
    /// Candidates are the non-categorical, non-protected feature columns;
    /// one-hot columns and the target are never considered. The returned
    /// table keeps all non-candidate columns plus the surviving candidates,
    /// in their original order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is empty.
    pub fn reduce(&self, table: &FeatureTable) -> Result<(FeatureTable, VifReport)> {
        if table.n_rows() == 0 {
            return Err(PronosticarError::empty_table("vif_input"));
        }

        let mut candidates: Vec<usize> = table
            .numeric_feature_indices()
            .into_iter()
            .filter(|&j| {
                !self
                    .config
                    .protected
                    .iter()
                    .any(|p| p == &table.feature_names()[j])
            })
            .collect();

        let mut report = VifReport {
            dropped: Vec::new(),
            aborted: None,
        };

        // Each pass drops exactly one candidate, so the loop terminates in
        // at most candidates.len() - 1 iterations.
        while candidates.len() >= 2 {
            let mut worst: Option<(usize, f32)> = None;

            for (slot, &j) in candidates.iter().enumerate() {
                let others: Vec<usize> = candidates
                    .iter()
                    .enumerate()
                    .filter(|&(s, _)| s != slot)
                    .map(|(_, &c)| c)
                    .collect();

                match vif_for(table, j, &others) {
                    Ok(vif) => {
                        if worst.map_or(true, |(_, w)| vif > w) {
                            worst = Some((slot, vif));
                        }
                    }
                    Err(e) => {
                        let reason = format!(
                            "VIF for '{}' failed: {e}",
                            table.feature_names()[j]
                        );
                        log::error!("{reason}");
                        report.aborted = Some(reason);
                        let reduced = keep_surviving(table, &candidates, &report)?;
                        return Ok((reduced, report));
                    }
                }
            }

            match worst {
                Some((slot, vif)) if vif > self.config.threshold => {
                    let j = candidates.remove(slot);
                    let name = table.feature_names()[j].clone();
                    log::info!("VIF drop: '{name}' at {vif:.2}");
                    report.dropped.push((name, vif));
                }
                _ => break,
            }
        }

        let reduced = keep_surviving(table, &candidates, &report)?;
        log::info!("VIF reduction: {report}");
        Ok((reduced, report))
    }
}

/// VIF of column `j` regressed on the `others` (with intercept).
fn vif_for(table: &FeatureTable, j: usize, others: &[usize]) -> Result<f32> {
    let n = table.n_rows();
    let y: Vector<f32> = Vector::from_vec((0..n).map(|i| table.value(i, j)).collect());

    // Design matrix: intercept + other candidates
    let p = others.len() + 1;
    let mut data = Vec::with_capacity(n * p);
    for i in 0..n {
        data.push(1.0);
        for &o in others {
            data.push(table.value(i, o));
        }
    }
    let x = Matrix::from_vec(n, p, data).map_err(PronosticarError::from)?;

    let xt = x.transpose();
    let xtx = xt.matmul(&x).map_err(PronosticarError::from)?;
    let xty = xt.matvec(&y).map_err(PronosticarError::from)?;
    let beta = xtx
        .cholesky_solve(&xty)
        .map_err(|_| PronosticarError::SingularMatrix {
            context: "vif".to_string(),
        })?;

    let y_hat = x.matvec(&beta).map_err(PronosticarError::from)?;
    let r2 = r_squared(&y_hat, &y);

    if r2 >= 1.0 - 1e-6 {
        Ok(f32::INFINITY)
    } else {
        Ok(1.0 / (1.0 - r2))
    }
}

/// Rebuilds the table without the dropped candidates.
fn keep_surviving(
    table: &FeatureTable,
    _candidates: &[usize],
    report: &VifReport,
) -> Result<FeatureTable> {
    let dropped: Vec<&str> = report.dropped.iter().map(|(n, _)| n.as_str()).collect();
    let keep: Vec<String> = table
        .feature_names()
        .iter()
        .filter(|n| !dropped.contains(&n.as_str()))
        .cloned()
        .collect();
    table.select_features(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// n rows; col0 independent, col1 = 2*col0 + tiny noise (collinear),
    /// col2 independent.
    fn collinear_table() -> FeatureTable {
        let n = 30;
        let mut data = Vec::new();
        for i in 0..n {
            let a = i as f32;
            let b = 2.0 * a + if i % 2 == 0 { 0.001 } else { -0.001 };
            let c = (i as f32 * 0.7).sin() * 10.0;
            data.extend_from_slice(&[a, b, c]);
        }
        FeatureTable::new(
            (0..n as u64).collect(),
            (0..n).map(|i| format!("E{i}")).collect(),
            vec![2000; n],
            vec!["a".into(), "a_twin".into(), "c".into()],
            vec![false, false, false],
            Matrix::from_vec(n, 3, data).expect("matrix"),
            Vector::from_vec(vec![0.0; n]),
        )
        .expect("table")
    }

    #[test]
    fn test_collinear_feature_dropped() {
        let reducer = VifReducer::new(VifConfig::default());
        let table = collinear_table();
        let (reduced, report) = reducer.reduce(&table).expect("reduce");

        assert_eq!(report.dropped.len(), 1);
        // One of the collinear pair goes; the independent column survives
        let dropped_name = &report.dropped[0].0;
        assert!(dropped_name == "a" || dropped_name == "a_twin");
        assert!(reduced.feature_index("c").is_some());
        assert_eq!(reduced.n_features(), 2);
        assert!(report.aborted.is_none());
    }

    #[test]
    fn test_protected_feature_never_dropped() {
        let reducer = VifReducer::new(VifConfig::default().with_protected(["a_twin"]));
        let table = collinear_table();
        let (reduced, report) = reducer.reduce(&table).expect("reduce");

        assert!(reduced.feature_index("a_twin").is_some());
        for (name, _) in &report.dropped {
            assert_ne!(name, "a_twin");
        }
    }

    #[test]
    fn test_independent_features_untouched() {
        let n = 20;
        let mut data = Vec::new();
        for i in 0..n {
            data.push(i as f32);
            data.push((i as f32 * 1.3).cos() * 5.0);
        }
        let table = FeatureTable::new(
            (0..n as u64).collect(),
            (0..n).map(|i| format!("E{i}")).collect(),
            vec![2000; n],
            vec!["a".into(), "b".into()],
            vec![false, false],
            Matrix::from_vec(n, 2, data).expect("matrix"),
            Vector::from_vec(vec![0.0; n]),
        )
        .expect("table");

        let reducer = VifReducer::new(VifConfig::default());
        let (reduced, report) = reducer.reduce(&table).expect("reduce");
        assert!(report.dropped.is_empty());
        assert_eq!(reduced.n_features(), 2);
    }

    #[test]
    fn test_categorical_columns_never_candidates() {
        let n = 12;
        let mut data = Vec::new();
        for i in 0..n {
            // Indicator column duplicated: perfectly collinear, but flagged
            // categorical so the reducer must ignore both
            let ind = f32::from(i % 2 == 0);
            data.push(ind);
            data.push(ind);
        }
        let table = FeatureTable::new(
            (0..n as u64).collect(),
            (0..n).map(|i| format!("E{i}")).collect(),
            vec![2000; n],
            vec!["Entity_X".into(), "Entity_Y".into()],
            vec![true, true],
            Matrix::from_vec(n, 2, data).expect("matrix"),
            Vector::from_vec(vec![0.0; n]),
        )
        .expect("table");

        let reducer = VifReducer::new(VifConfig::default());
        let (reduced, report) = reducer.reduce(&table).expect("reduce");
        assert!(report.dropped.is_empty());
        assert_eq!(reduced.n_features(), 2);
    }

    #[test]
    fn test_terminates_within_feature_count() {
        // Several mutually collinear columns; the loop must end with at
        // most n_features drops and no hang
        let n = 25;
        let mut data = Vec::new();
        for i in 0..n {
            let a = i as f32;
            data.extend_from_slice(&[
                a,
                2.0 * a + 0.01,
                3.0 * a - 0.02,
                (a * 0.9).sin() * 4.0,
            ]);
        }
        let table = FeatureTable::new(
            (0..n as u64).collect(),
            (0..n).map(|i| format!("E{i}")).collect(),
            vec![2000; n],
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            vec![false; 4],
            Matrix::from_vec(n, 4, data).expect("matrix"),
            Vector::from_vec(vec![0.0; n]),
        )
        .expect("table");

        let reducer = VifReducer::new(VifConfig::default());
        let (reduced, report) = reducer.reduce(&table).expect("reduce");
        assert!(report.dropped.len() <= 4);
        assert!(reduced.n_features() >= 1);
    }
}
