//! `FeatureTable`: the algorithm-ready numeric table.
//!
//! A `FeatureTable` is what the encoders produce and what the outlier
//! filter, VIF reducer, trainer, and forecaster consume: a feature matrix
//! plus the target, with entity/year/row-id provenance carried as parallel
//! vectors. Provenance is never dropped by a transform: the whitelist
//! check, per-entity metrics, and recursive lag propagation all depend on
//! it, and reconstructing it after the fact by value matching is exactly
//! the failure mode this type exists to rule out.

use crate::error::{PronosticarError, Result};
use crate::primitives::{Matrix, Vector};
use std::collections::HashMap;

/// Rectangular feature matrix with named columns and row provenance.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    row_ids: Vec<u64>,
    entities: Vec<String>,
    years: Vec<i32>,
    feature_names: Vec<String>,
    /// Parallel to `feature_names`; true for encoded entity columns, which
    /// are exempt from outlier screening, VIF reduction, and scaling.
    categorical: Vec<bool>,
    x: Matrix<f32>,
    target: Vector<f32>,
}

impl FeatureTable {
    /// Builds a table from parallel parts.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the parallel lengths disagree.
    pub fn new(
        row_ids: Vec<u64>,
        entities: Vec<String>,
        years: Vec<i32>,
        feature_names: Vec<String>,
        categorical: Vec<bool>,
        x: Matrix<f32>,
        target: Vector<f32>,
    ) -> Result<Self> {
        let n = x.n_rows();
        if row_ids.len() != n || entities.len() != n || years.len() != n || target.len() != n {
            return Err(PronosticarError::DimensionMismatch {
                expected: format!("{n} rows in every parallel vector"),
                actual: format!(
                    "ids={}, entities={}, years={}, target={}",
                    row_ids.len(),
                    entities.len(),
                    years.len(),
                    target.len()
                ),
            });
        }
        if feature_names.len() != x.n_cols() || categorical.len() != x.n_cols() {
            return Err(PronosticarError::DimensionMismatch {
                expected: format!("{} feature names/flags", x.n_cols()),
                actual: format!("{}/{}", feature_names.len(), categorical.len()),
            });
        }
        Ok(Self {
            row_ids,
            entities,
            years,
            feature_names,
            categorical,
            x,
            target,
        })
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.x.n_rows()
    }

    /// Returns the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.x.n_cols()
    }

    /// Returns the feature matrix.
    #[must_use]
    pub fn x(&self) -> &Matrix<f32> {
        &self.x
    }

    /// Returns the raw-unit target vector.
    #[must_use]
    pub fn target(&self) -> &Vector<f32> {
        &self.target
    }

    /// Returns the provenance ids.
    #[must_use]
    pub fn row_ids(&self) -> &[u64] {
        &self.row_ids
    }

    /// Returns the entity of each row.
    #[must_use]
    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    /// Returns the year of each row.
    #[must_use]
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    /// Returns the feature names in column order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Returns true if the column holds an encoded entity indicator.
    #[must_use]
    pub fn is_categorical(&self, col: usize) -> bool {
        self.categorical[col]
    }

    /// Indices of the non-categorical feature columns.
    #[must_use]
    pub fn numeric_feature_indices(&self) -> Vec<usize> {
        (0..self.n_features())
            .filter(|&j| !self.categorical[j])
            .collect()
    }

    /// Looks up a feature column by name.
    #[must_use]
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// Reads one feature value.
    #[must_use]
    pub fn value(&self, row: usize, col: usize) -> f32 {
        self.x.get(row, col)
    }

    /// Writes one feature value (used by the recursive lag injection).
    pub fn set_value(&mut self, row: usize, col: usize, value: f32) {
        self.x.set(row, col, value);
    }

    /// Builds a new table from the given row indices, provenance included.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            row_ids: indices.iter().map(|&i| self.row_ids[i]).collect(),
            entities: indices.iter().map(|&i| self.entities[i].clone()).collect(),
            years: indices.iter().map(|&i| self.years[i]).collect(),
            feature_names: self.feature_names.clone(),
            categorical: self.categorical.clone(),
            x: self.x.select_rows(indices),
            target: Vector::from_vec(indices.iter().map(|&i| self.target[i]).collect()),
        }
    }

    /// Builds a new table keeping only the named feature columns, in the
    /// order given.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown.
    pub fn select_features(&self, names: &[String]) -> Result<Self> {
        let indices: Vec<usize> = names
            .iter()
            .map(|name| {
                self.feature_index(name)
                    .ok_or_else(|| PronosticarError::missing_column(name))
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            row_ids: self.row_ids.clone(),
            entities: self.entities.clone(),
            years: self.years.clone(),
            feature_names: names.to_vec(),
            categorical: indices.iter().map(|&j| self.categorical[j]).collect(),
            x: self.x.select_columns(&indices),
            target: self.target.clone(),
        })
    }

    /// Chronological split: rows with `year < split_year` go left, the rest
    /// right.
    #[must_use]
    pub fn split_by_year(&self, split_year: i32) -> (Self, Self) {
        let train: Vec<usize> = (0..self.n_rows())
            .filter(|&i| self.years[i] < split_year)
            .collect();
        let test: Vec<usize> = (0..self.n_rows())
            .filter(|&i| self.years[i] >= split_year)
            .collect();
        (self.select_rows(&train), self.select_rows(&test))
    }

    /// Row indices observed at the given year.
    #[must_use]
    pub fn rows_at_year(&self, year: i32) -> Vec<usize> {
        (0..self.n_rows())
            .filter(|&i| self.years[i] == year)
            .collect()
    }

    /// Distinct years in ascending order.
    #[must_use]
    pub fn distinct_years(&self) -> Vec<i32> {
        let mut years = self.years.clone();
        years.sort_unstable();
        years.dedup();
        years
    }

    /// Builds an (entity, year) → row index lookup.
    ///
    /// The (entity, year) key is unique by the panel invariant, so the map
    /// is total over the table's rows.
    #[must_use]
    pub fn row_lookup(&self) -> HashMap<(String, i32), usize> {
        let mut map = HashMap::with_capacity(self.n_rows());
        for i in 0..self.n_rows() {
            map.insert((self.entities[i].clone(), self.years[i]), i);
        }
        map
    }
}
