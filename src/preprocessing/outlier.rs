//! IQR outlier removal with a protected-entity whitelist.
//!
//! Major economies are statistical outliers by construction (their
//! emissions and GDP dwarf the panel median), so a plain IQR rule would
//! discard exactly the rows the model most needs. The filter therefore
//! takes a configured set of protected entities that are never removed,
//! evaluated on entity identity from the table's provenance, never on an
//! encoded representation, which no longer exists after one-hot encoding.
//!
//! The filter also emits an [`IndexMap`] relating filtered row positions to
//! the rows of the unfiltered table. It is produced here, at filtering
//! time; reconstructing the mapping later by fuzzy value matching is a
//! workaround for lost provenance, not a supported operation.

use crate::data::FeatureTable;
use crate::error::{PronosticarError, Result};
use crate::preprocessing::quantile_sorted;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// Default protected entities: G20 economies plus the major regional
/// emitters the dropped-entity audits of the source data kept rescuing.
pub const DEFAULT_PROTECTED: &[&str] = &[
    "China",
    "United States",
    "India",
    "Russian Federation",
    "Japan",
    "Germany",
    "Brazil",
    "Canada",
    "United Kingdom",
    "France",
    "Italy",
    "Australia",
    "South Korea",
    "Saudi Arabia",
    "Turkey",
    "Indonesia",
    "Spain",
    "Mexico",
    "South Africa",
    "Thailand",
    "Poland",
    "Iran",
    "Egypt",
    "Pakistan",
    "Viet Nam",
    "Argentina",
    "Netherlands",
    "Philippines",
    "Malaysia",
    "Belgium",
    "Sweden",
    "Ukraine",
    "Kazakhstan",
    "United Arab Emirates",
    "Algeria",
    "Singapore",
    "Nigeria",
];

/// Configuration for [`IqrOutlierFilter`].
///
/// Both the whitelist and the multiplier are policy choices tuned
/// empirically, so they are injectable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierConfig {
    /// IQR multiplier `t`; a row is extreme outside [Q1 − t·IQR, Q3 + t·IQR].
    pub threshold: f32,
    /// Entities never removed, however extreme their rows.
    pub protected: Vec<String>,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            // Deliberately loose, to avoid discarding legitimate extremes
            threshold: 3.0,
            protected: DEFAULT_PROTECTED.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl OutlierConfig {
    /// Sets the IQR multiplier.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Replaces the protected-entity list.
    #[must_use]
    pub fn with_protected<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected = entities.into_iter().map(Into::into).collect();
        self
    }
}

/// Row-position mapping from a filtered table back to its source table.
///
/// Persisted as a two-column CSV so downstream consumers can re-attach
/// entity/year without heuristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMap {
    /// `pairs[filtered_position] = original_position`.
    pairs: Vec<usize>,
    /// Provenance id of each kept row, parallel to `pairs`.
    row_ids: Vec<u64>,
}

impl IndexMap {
    /// Builds a map from kept original positions and their row ids.
    #[must_use]
    pub fn new(pairs: Vec<usize>, row_ids: Vec<u64>) -> Self {
        Self { pairs, row_ids }
    }

    /// Number of filtered rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if no rows survived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Original position of a filtered row.
    #[must_use]
    pub fn to_original(&self, filtered: usize) -> Option<usize> {
        self.pairs.get(filtered).copied()
    }

    /// Filtered position of an original row, if it survived.
    #[must_use]
    pub fn to_filtered(&self, original: usize) -> Option<usize> {
        self.pairs.iter().position(|&o| o == original)
    }

    /// Provenance id of a filtered row.
    #[must_use]
    pub fn row_id(&self, filtered: usize) -> Option<u64> {
        self.row_ids.get(filtered).copied()
    }

    /// Writes the map as a `filtered_index,original_index` CSV.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(["filtered_index", "original_index", "row_id"])?;
        for (filtered, (&original, &row_id)) in
            self.pairs.iter().zip(self.row_ids.iter()).enumerate()
        {
            writer.write_record([
                filtered.to_string(),
                original.to_string(),
                row_id.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads a map previously written by [`IndexMap::save_csv`].
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or parse failure.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let mut pairs = Vec::new();
        let mut row_ids = Vec::new();
        let mut line = 1u64;
        for record in reader.records() {
            let record = record?;
            line += 1;
            let original: usize = record
                .get(1)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| PronosticarError::CsvParse {
                    line,
                    message: "bad original_index".to_string(),
                })?;
            let row_id: u64 = record
                .get(2)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| PronosticarError::CsvParse {
                    line,
                    message: "bad row_id".to_string(),
                })?;
            pairs.push(original);
            row_ids.push(row_id);
        }
        Ok(Self { pairs, row_ids })
    }
}

/// What the filter removed, for auditability.
#[derive(Debug, Clone)]
pub struct OutlierReport {
    /// Rows removed in total.
    pub rows_removed: usize,
    /// Rows kept because their entity is protected (would-be outliers only).
    pub protected_kept: usize,
    /// Removed-row count per entity, entities in name order.
    pub removed_per_entity: BTreeMap<String, usize>,
    /// Entities that lost every row. Intended behavior for noise entities
    /// and micro-states, but always logged by name.
    pub eliminated_entities: Vec<String>,
    /// Columns skipped because their IQR was zero (e.g. fully imputed).
    pub zero_iqr_columns: Vec<String>,
}

impl fmt::Display for OutlierReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "removed {} rows ({} entities eliminated, {} protected rows kept, {} zero-IQR columns skipped)",
            self.rows_removed,
            self.eliminated_entities.len(),
            self.protected_kept,
            self.zero_iqr_columns.len()
        )
    }
}

/// Multivariate IQR outlier filter with whitelist protection.
#[derive(Debug, Clone, Default)]
pub struct IqrOutlierFilter {
    config: OutlierConfig,
}

impl IqrOutlierFilter {
    /// Creates a filter with the given configuration.
    #[must_use]
    pub fn new(config: OutlierConfig) -> Self {
        Self { config }
    }

    /// Removes outlier rows, exempting protected entities.
    ///
    /// Quantiles are computed over the unprotected rows only; protected
    /// rows are set aside before the bounds are fitted. A row is an
    /// outlier if any considered column (the non-categorical features plus
    /// the target) falls outside [Q1 − t·IQR, Q3 + t·IQR]. Columns with
    /// zero IQR are skipped and reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or if filtering removes every
    /// row.
    pub fn filter(
        &self,
        table: &FeatureTable,
    ) -> Result<(FeatureTable, IndexMap, OutlierReport)> {
        let n = table.n_rows();
        if n == 0 {
            return Err(PronosticarError::empty_table("outlier_filter_input"));
        }

        let protected: HashSet<&str> =
            self.config.protected.iter().map(String::as_str).collect();
        let is_protected: Vec<bool> = table
            .entities()
            .iter()
            .map(|e| protected.contains(e.as_str()))
            .collect();

        let clean_rows: Vec<usize> = (0..n).filter(|&i| !is_protected[i]).collect();

        // Considered columns: numeric features plus the raw target
        let numeric = table.numeric_feature_indices();

        let mut zero_iqr_columns = Vec::new();
        let mut bounds: Vec<(usize, f32, f32)> = Vec::new(); // (col, lo, hi); col == usize::MAX is the target
        let t = self.config.threshold;

        let mut column_bounds = |values: Vec<f32>, label: &str, col: usize| {
            let mut sorted = values;
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let q1 = quantile_sorted(&sorted, 0.25);
            let q3 = quantile_sorted(&sorted, 0.75);
            let iqr = q3 - q1;
            if iqr <= 0.0 {
                zero_iqr_columns.push(label.to_string());
            } else {
                bounds.push((col, q1 - t * iqr, q3 + t * iqr));
            }
        };

        for &j in &numeric {
            let values: Vec<f32> = clean_rows.iter().map(|&i| table.value(i, j)).collect();
            column_bounds(values, &table.feature_names()[j], j);
        }
        let target_values: Vec<f32> = clean_rows.iter().map(|&i| table.target()[i]).collect();
        column_bounds(target_values, "target", usize::MAX);

        let is_outlier = |row: usize| -> bool {
            bounds.iter().any(|&(col, lo, hi)| {
                let v = if col == usize::MAX {
                    table.target()[row]
                } else {
                    table.value(row, col)
                };
                v < lo || v > hi
            })
        };

        let mut kept = Vec::new();
        let mut protected_kept = 0;
        let mut removed_per_entity: BTreeMap<String, usize> = BTreeMap::new();
        for i in 0..n {
            if is_protected[i] {
                if is_outlier(i) {
                    protected_kept += 1;
                }
                kept.push(i);
            } else if is_outlier(i) {
                *removed_per_entity
                    .entry(table.entities()[i].clone())
                    .or_insert(0) += 1;
            } else {
                kept.push(i);
            }
        }

        if kept.is_empty() {
            return Err(PronosticarError::empty_table("outlier_filter"));
        }

        let filtered = table.select_rows(&kept);

        let before: HashSet<&str> = table.entities().iter().map(String::as_str).collect();
        let after: HashSet<&str> = filtered.entities().iter().map(String::as_str).collect();
        let mut eliminated: Vec<String> = before
            .difference(&after)
            .map(|s| (*s).to_string())
            .collect();
        eliminated.sort();

        let index_map = IndexMap::new(
            kept.clone(),
            kept.iter().map(|&i| table.row_ids()[i]).collect(),
        );

        let report = OutlierReport {
            rows_removed: n - filtered.n_rows(),
            protected_kept,
            removed_per_entity,
            eliminated_entities: eliminated,
            zero_iqr_columns,
        };

        log::info!("outlier filter (t={t}): {report}");
        if !report.eliminated_entities.is_empty() {
            log::warn!(
                "entities fully eliminated by outlier filter: {:?}",
                report.eliminated_entities
            );
        }

        Ok((filtered, index_map, report))
    }
}
