//! Panel (entity × year) table with immutable row provenance.
//!
//! The panel is the ingestion-side data model: one row per (entity, year)
//! observation, named numeric columns, and a `row_id` assigned once at load
//! time and carried through every transform. Downstream stages (outlier
//! whitelisting, per-entity metrics, recursive lag propagation) all need to
//! answer "which entity/year is this row"; the id is never dropped and
//! never reconstructed by value matching.

mod loader;

pub use loader::PanelReader;

use crate::error::{PronosticarError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Columnar (entity, year) panel.
///
/// Missing numeric values are stored as NaN until imputation. All parallel
/// vectors (ids, entities, years, every column) always have equal length.
#[derive(Debug, Clone)]
pub struct Panel {
    row_ids: Vec<u64>,
    entities: Vec<String>,
    years: Vec<i32>,
    columns: Vec<(String, Vec<f32>)>,
}

/// Count of imputed cells per column.
#[derive(Debug, Clone, Default)]
pub struct ImputeReport {
    /// (column name, imputed cell count), only columns with at least one.
    pub imputed: Vec<(String, usize)>,
}

impl fmt::Display for ImputeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total: usize = self.imputed.iter().map(|(_, n)| n).sum();
        write!(f, "imputed {total} cells across {} columns", self.imputed.len())
    }
}

/// Outcome of lag-feature generation.
///
/// Dropping rows that lack a valid lag is the dominant source of entity
/// loss between the raw and preprocessed stages, so the report names the
/// entities that vanished outright instead of hiding them in a count.
#[derive(Debug, Clone)]
pub struct LagReport {
    /// Names of the lag columns that were created.
    pub created: Vec<String>,
    /// Rows dropped because at least one lag value was unavailable.
    pub dropped_rows: usize,
    /// Entities that lost every row (history shorter than the lag depth).
    pub vanished_entities: Vec<String>,
}

impl fmt::Display for LagReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created {:?}, dropped {} rows, {} entities vanished",
            self.created,
            self.dropped_rows,
            self.vanished_entities.len()
        )
    }
}

impl Panel {
    /// Builds a panel from parallel vectors.
    ///
    /// Row ids are assigned 0..n in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if lengths disagree, if no rows or columns are
    /// supplied, or if an (entity, year) key repeats.
    pub fn new(
        entities: Vec<String>,
        years: Vec<i32>,
        columns: Vec<(String, Vec<f32>)>,
    ) -> Result<Self> {
        let n = entities.len();
        if n == 0 {
            return Err(PronosticarError::empty_table("panel_new"));
        }
        if years.len() != n {
            return Err(PronosticarError::DimensionMismatch {
                expected: format!("{n} years"),
                actual: format!("{}", years.len()),
            });
        }
        for (name, col) in &columns {
            if col.len() != n {
                return Err(PronosticarError::DimensionMismatch {
                    expected: format!("{n} rows in column '{name}'"),
                    actual: format!("{}", col.len()),
                });
            }
        }

        let mut seen = HashSet::with_capacity(n);
        for i in 0..n {
            if !seen.insert((entities[i].clone(), years[i])) {
                return Err(PronosticarError::DuplicateObservation {
                    entity: entities[i].clone(),
                    year: years[i],
                });
            }
        }

        Ok(Self {
            row_ids: (0..n as u64).collect(),
            entities,
            years,
            columns,
        })
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.entities.len()
    }

    /// Returns the provenance ids, parallel to the rows.
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

    /// Returns the numeric column names in storage order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Returns a numeric column by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the column doesn't exist.
    pub fn column(&self, name: &str) -> Result<&[f32]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| PronosticarError::missing_column(name))
    }

    /// Applies a stable sort by (entity, year) to every parallel vector.
    ///
    /// Provenance ids travel with their rows.
    pub fn sort_by_entity_year(&mut self) {
        let mut order: Vec<usize> = (0..self.n_rows()).collect();
        order.sort_by(|&a, &b| {
            self.entities[a]
                .cmp(&self.entities[b])
                .then(self.years[a].cmp(&self.years[b]))
        });
        self.permute(&order);
    }

    fn permute(&mut self, order: &[usize]) {
        self.row_ids = order.iter().map(|&i| self.row_ids[i]).collect();
        self.entities = order.iter().map(|&i| self.entities[i].clone()).collect();
        self.years = order.iter().map(|&i| self.years[i]).collect();
        for (_, col) in &mut self.columns {
            *col = order.iter().map(|&i| col[i]).collect();
        }
    }

    /// Keeps only the rows whose index satisfies the mask.
    ///
    /// # Panics
    ///
    /// Panics if the mask length differs from the row count.
    pub fn retain_rows(&mut self, mask: &[bool]) {
        assert_eq!(mask.len(), self.n_rows(), "mask must cover every row");
        let keep: Vec<usize> = (0..self.n_rows()).filter(|&i| mask[i]).collect();
        self.permute(&keep);
    }

    /// Drops every row of the given year, returning the removed-row count.
    ///
    /// Used to excise years with known data-quality problems before any
    /// model-specific preprocessing.
    pub fn drop_year(&mut self, year: i32) -> usize {
        let before = self.n_rows();
        let mask: Vec<bool> = self.years.iter().map(|&y| y != year).collect();
        self.retain_rows(&mask);
        let removed = before - self.n_rows();
        if removed > 0 {
            log::info!("dropped {removed} rows of year {year}");
        }
        removed
    }

    /// Imputes missing (NaN) cells with the column median over the whole
    /// panel.
    ///
    /// The median is computed globally, not per train split, a documented
    /// simplification. Columns that are entirely missing stay untouched
    /// and are reported with count 0.
    pub fn impute_median(&mut self) -> ImputeReport {
        let mut report = ImputeReport::default();
        for (name, col) in &mut self.columns {
            let mut present: Vec<f32> = col.iter().copied().filter(|v| !v.is_nan()).collect();
            if present.is_empty() {
                continue;
            }
            present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let median = if present.len() % 2 == 0 {
                (present[present.len() / 2 - 1] + present[present.len() / 2]) / 2.0
            } else {
                present[present.len() / 2]
            };

            let mut count = 0;
            for v in col.iter_mut() {
                if v.is_nan() {
                    *v = median;
                    count += 1;
                }
            }
            if count > 0 {
                report.imputed.push((name.clone(), count));
            }
        }
        log::info!("{report}");
        report
    }

    /// Creates `<col>_lag<k>` columns and drops rows without a valid lag.
    ///
    /// The lag for (entity, year) is the source value at (entity, year - k)
    /// (an exact year match within the same entity), so gaps in an entity's
    /// history do not silently shorten the lag. Rows whose lag is missing
    /// (the first k observed years of each entity, or rows after a gap) are
    /// dropped, and entities that lose every row are named in the report.
    ///
    /// # Errors
    ///
    /// Returns an error if a source column doesn't exist, if a lag column
    /// name already exists, or if every row is dropped.
    pub fn add_lag_features(&mut self, source_cols: &[&str], k: u32) -> Result<LagReport> {
        if k == 0 {
            return Err(PronosticarError::InvalidHyperparameter {
                param: "k".to_string(),
                value: "0".to_string(),
                constraint: "lag depth >= 1".to_string(),
            });
        }

        let entities_before: HashSet<String> = self.entities.iter().cloned().collect();
        let mut created = Vec::new();

        for &src in source_cols {
            let values = self.column(src)?.to_vec();
            let lag_name = format!("{src}_lag{k}");
            if self.columns.iter().any(|(n, _)| n == &lag_name) {
                return Err(PronosticarError::Other(format!(
                    "lag column '{lag_name}' already exists"
                )));
            }

            // (entity, year) -> source value for the exact-year lookup
            let mut by_key: HashMap<(&str, i32), f32> = HashMap::with_capacity(self.n_rows());
            for i in 0..self.n_rows() {
                by_key.insert((self.entities[i].as_str(), self.years[i]), values[i]);
            }

            let lagged: Vec<f32> = (0..self.n_rows())
                .map(|i| {
                    by_key
                        .get(&(self.entities[i].as_str(), self.years[i] - k as i32))
                        .copied()
                        .unwrap_or(f32::NAN)
                })
                .collect();

            self.columns.push((lag_name.clone(), lagged));
            created.push(lag_name);
        }

        let before = self.n_rows();
        let mask: Vec<bool> = (0..self.n_rows())
            .map(|i| {
                created.iter().all(|name| {
                    let col = self
                        .columns
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v[i])
                        .unwrap_or(f32::NAN);
                    !col.is_nan()
                })
            })
            .collect();
        self.retain_rows(&mask);

        if self.n_rows() == 0 {
            return Err(PronosticarError::empty_table("lag_features"));
        }

        let entities_after: HashSet<String> = self.entities.iter().cloned().collect();
        let mut vanished: Vec<String> = entities_before
            .difference(&entities_after)
            .cloned()
            .collect();
        vanished.sort();

        let report = LagReport {
            created,
            dropped_rows: before - self.n_rows(),
            vanished_entities: vanished,
        };
        log::info!("lag features: {report}");
        if !report.vanished_entities.is_empty() {
            log::warn!(
                "entities lost to lag generation: {:?}",
                report.vanished_entities
            );
        }
        Ok(report)
    }

    /// Applies ln(1 + x) to the named columns in place.
    ///
    /// Used on heavily right-skewed covariates (financial flows,
    /// renewables shares) before scale-sensitive models. Values below -1
    /// become NaN and fall to the imputer.
    ///
    /// # Errors
    ///
    /// Returns an error if a column doesn't exist.
    pub fn log1p_columns(&mut self, cols: &[&str]) -> Result<()> {
        for &name in cols {
            self.column(name)?; // existence check before any mutation
        }
        for &name in cols {
            for (n, col) in &mut self.columns {
                if n == name {
                    for v in col.iter_mut() {
                        *v = v.ln_1p();
                    }
                }
            }
        }
        Ok(())
    }

    /// Counts rows per entity, in entity name order.
    #[must_use]
    pub fn rows_per_entity(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.entities {
            *counts.entry(e.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
#[path = "tests_lag_contract.rs"]
mod tests_lag_contract;

#[cfg(test)]
mod tests {
    use super::*;

    fn small_panel() -> Panel {
        // Two entities, three years each, one covariate
        Panel::new(
            vec![
                "Aruba".into(),
                "Aruba".into(),
                "Aruba".into(),
                "Brazil".into(),
                "Brazil".into(),
                "Brazil".into(),
            ],
            vec![2000, 2001, 2002, 2000, 2001, 2002],
            vec![
                (
                    "co2".to_string(),
                    vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0],
                ),
                (
                    "gdp".to_string(),
                    vec![5.0, 6.0, 7.0, 50.0, 60.0, 70.0],
                ),
            ],
        )
        .expect("panel")
    }

    #[test]
    fn test_new_assigns_row_ids_in_order() {
        let p = small_panel();
        assert_eq!(p.row_ids(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_new_rejects_duplicate_observation() {
        let result = Panel::new(
            vec!["A".into(), "A".into()],
            vec![2000, 2000],
            vec![("x".to_string(), vec![1.0, 2.0])],
        );
        assert!(matches!(
            result,
            Err(PronosticarError::DuplicateObservation { .. })
        ));
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let result = Panel::new(
            vec!["A".into(), "B".into()],
            vec![2000, 2000],
            vec![("x".to_string(), vec![1.0])],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_column_lookup() {
        let p = small_panel();
        assert_eq!(p.column("co2").expect("co2")[3], 10.0);
        assert!(p.column("nope").is_err());
    }

    #[test]
    fn test_sort_preserves_provenance() {
        let mut p = Panel::new(
            vec!["B".into(), "A".into()],
            vec![2001, 2000],
            vec![("x".to_string(), vec![9.0, 1.0])],
        )
        .expect("panel");
        p.sort_by_entity_year();
        assert_eq!(p.entities(), &["A".to_string(), "B".to_string()]);
        // Row ids moved with their rows
        assert_eq!(p.row_ids(), &[1, 0]);
        assert_eq!(p.column("x").expect("x"), &[1.0, 9.0]);
    }

    #[test]
    fn test_impute_median() {
        let mut p = Panel::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![2000, 2000, 2000],
            vec![("x".to_string(), vec![1.0, f32::NAN, 3.0])],
        )
        .expect("panel");
        let report = p.impute_median();
        assert_eq!(report.imputed, vec![("x".to_string(), 1)]);
        assert_eq!(p.column("x").expect("x")[1], 2.0);
    }

    #[test]
    fn test_impute_leaves_all_missing_column() {
        let mut p = Panel::new(
            vec!["A".into(), "B".into()],
            vec![2000, 2000],
            vec![("x".to_string(), vec![f32::NAN, f32::NAN])],
        )
        .expect("panel");
        let report = p.impute_median();
        assert!(report.imputed.is_empty());
        assert!(p.column("x").expect("x")[0].is_nan());
    }

    #[test]
    fn test_lag_values_match_prior_year_same_entity() {
        let mut p = small_panel();
        let report = p.add_lag_features(&["co2"], 1).expect("lags");

        assert_eq!(report.created, vec!["co2_lag1".to_string()]);
        // First year of each entity is dropped
        assert_eq!(report.dropped_rows, 2);
        assert_eq!(p.n_rows(), 4);

        let lag = p.column("co2_lag1").expect("lag");
        let co2 = p.column("co2").expect("co2");
        for i in 0..p.n_rows() {
            // lag at year Y equals co2 at Y-1 for the same entity
            let entity = &p.entities()[i];
            let year = p.years()[i];
            let prior = (0..co2.len())
                .find(|&j| &p.entities()[j] == entity && p.years()[j] == year - 1)
                .map(|j| co2[j]);
            if let Some(prev) = prior {
                assert_eq!(lag[i], prev);
            }
        }
        // Concretely: Aruba 2001 lag = Aruba 2000 co2
        assert_eq!(lag[0], 1.0);
    }

    #[test]
    fn test_lag_exact_year_match_skips_gap() {
        // Entity with a gap: 2000, 2002. The 2002 row has no 2001
        // observation, so lag1 is unavailable and the row is dropped.
        let mut p = Panel::new(
            vec!["A".into(), "A".into()],
            vec![2000, 2002],
            vec![("x".to_string(), vec![1.0, 2.0])],
        )
        .expect("panel");
        let result = p.add_lag_features(&["x"], 1);
        // Every row lacks a lag -> empty table error
        assert!(matches!(result, Err(PronosticarError::EmptyTable { .. })));
    }

    #[test]
    fn test_short_history_entity_vanishes_and_is_named() {
        let mut p = Panel::new(
            vec!["Long".into(), "Long".into(), "Short".into()],
            vec![2000, 2001, 2000],
            vec![("x".to_string(), vec![1.0, 2.0, 9.0])],
        )
        .expect("panel");
        let report = p.add_lag_features(&["x"], 1).expect("lags");
        assert_eq!(report.vanished_entities, vec!["Short".to_string()]);
        assert_eq!(p.n_rows(), 1);
    }

    #[test]
    fn test_drop_year() {
        let mut p = small_panel();
        let removed = p.drop_year(2001);
        assert_eq!(removed, 2);
        assert!(!p.years().contains(&2001));
        assert_eq!(p.n_rows(), 4);
    }

    #[test]
    fn test_lag_zero_rejected() {
        let mut p = small_panel();
        assert!(p.add_lag_features(&["co2"], 0).is_err());
    }

    #[test]
    fn test_log1p_columns() {
        let mut p = small_panel();
        p.log1p_columns(&["gdp"]).expect("log1p");
        let gdp = p.column("gdp").expect("gdp");
        assert!((gdp[0] - 5.0f32.ln_1p()).abs() < 1e-6);
        // co2 untouched
        assert_eq!(p.column("co2").expect("co2")[0], 1.0);
    }

    #[test]
    fn test_log1p_unknown_column_errors() {
        let mut p = small_panel();
        assert!(p.log1p_columns(&["nope"]).is_err());
    }

    #[test]
    fn test_rows_per_entity() {
        let p = small_panel();
        let counts = p.rows_per_entity();
        assert_eq!(counts["Aruba"], 3);
        assert_eq!(counts["Brazil"], 3);
    }
}
