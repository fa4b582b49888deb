//! Per-model feature pipelines.
//!
//! Three pipelines turn a cleaned [`Panel`] into an algorithm-ready
//! [`FeatureTable`]. The differences are configuration, not branching:
//!
//! - **Linear** (Ridge): log1p on skewed columns, one-hot entity fixed
//!   effects, whitelist-protected outlier removal, VIF reduction, z-score
//!   scaling. Linear models are sensitive to scale, skew, and
//!   multicollinearity, so this pipeline carries every corrective step.
//! - **Kernel** (SVR): log1p and one-hot as above, robust (median/IQR)
//!   scaling instead of z-score, a train-period correlation filter instead
//!   of outlier removal.
//! - **Tree** (gradient boosting): ordinal entity code, nothing else.
//!   Split-based learners are invariant to monotone transforms; the
//!   corrective steps above would be wasted work.
//!
//! Entity-identity masks (the outlier whitelist) are taken from the
//! panel's provenance *before* any destructive encoding. Scalers are
//! fitted on the chronological training slice only, and the lag column's
//! statistics are returned for the trained-model artifact.

use crate::data::FeatureTable;
use crate::error::{PronosticarError, Result};
use crate::model::TargetStats;
use crate::panel::Panel;
use crate::preprocessing::{
    IndexMap, IqrOutlierFilter, OneHotEncoder, OrdinalEncoder, OutlierConfig, OutlierReport,
    RobustScaler, StandardScaler, VifConfig, VifReducer, VifReport,
};
use crate::primitives::{Matrix, Vector};
use crate::traits::Transformer;

/// Prefix for one-hot entity indicator columns.
pub const ENTITY_PREFIX: &str = "Entity_";

/// Name of the ordinal entity-code column in the tree pipeline.
pub const ENTITY_CODE: &str = "entity_code";

/// A pipeline's output: the table plus everything the trainer needs.
#[derive(Debug, Clone)]
pub struct PreparedTable {
    /// The algorithm-ready table (scaled where the pipeline scales).
    pub table: FeatureTable,
    /// Filtered-row ↔ original-row mapping, when outlier removal ran.
    pub index_map: Option<IndexMap>,
    /// Outlier audit, when outlier removal ran.
    pub outlier_report: Option<OutlierReport>,
    /// VIF audit, when reduction ran.
    pub vif_report: Option<VifReport>,
    /// Features dropped by the correlation filter, when it ran.
    pub dropped_by_correlation: Vec<String>,
    /// Scaling statistics of the lag column's unscaled source, from the
    /// training slice. Identity (0, 1) when the pipeline does not scale.
    pub lag_stats: TargetStats,
}

enum EntityEncoding {
    OneHot,
    Ordinal,
}

/// Builds the base feature table: panel numeric columns (minus target)
/// followed by the encoded entity columns.
fn assemble_table(
    panel: &Panel,
    target: &str,
    encoding: &EntityEncoding,
) -> Result<FeatureTable> {
    let target_values = panel.column(target)?.to_vec();

    let numeric_names: Vec<String> = panel
        .column_names()
        .iter()
        .filter(|&&n| n != target)
        .map(|&n| n.to_string())
        .collect();
    let numeric_cols: Vec<&[f32]> = numeric_names
        .iter()
        .map(|n| panel.column(n))
        .collect::<Result<_>>()?;

    let (entity_names, entity_cols): (Vec<String>, Vec<Vec<f32>>) = match encoding {
        EntityEncoding::OneHot => {
            let mut encoder = OneHotEncoder::new();
            encoder.fit(panel.entities())?;
            let encoded = encoder.transform(panel.entities())?;
            let names = encoder.column_names(ENTITY_PREFIX);
            let cols = (0..encoded.n_cols())
                .map(|j| encoded.column(j).into_vec())
                .collect();
            (names, cols)
        }
        EntityEncoding::Ordinal => {
            let mut encoder = OrdinalEncoder::new();
            encoder.fit(panel.entities())?;
            let codes = encoder.transform(panel.entities())?;
            (vec![ENTITY_CODE.to_string()], vec![codes])
        }
    };

    let n = panel.n_rows();
    let n_numeric = numeric_names.len();
    let n_features = n_numeric + entity_names.len();
    let mut data = Vec::with_capacity(n * n_features);
    for i in 0..n {
        for col in &numeric_cols {
            data.push(col[i]);
        }
        for col in &entity_cols {
            data.push(col[i]);
        }
    }

    let mut feature_names = numeric_names;
    feature_names.extend(entity_names);
    let mut categorical = vec![false; n_numeric];
    categorical.extend(std::iter::repeat(true).take(n_features - n_numeric));

    FeatureTable::new(
        panel.row_ids().to_vec(),
        panel.entities().to_vec(),
        panel.years().to_vec(),
        feature_names,
        categorical,
        Matrix::from_vec(n, n_features, data).map_err(PronosticarError::from)?,
        Vector::from_vec(target_values),
    )
}

/// Fits the scaler on the training slice, transforms every row in place,
/// and returns the lag column's (center, scale) pair.
fn scale_numeric<S: Transformer + ScalerStats>(
    table: &mut FeatureTable,
    scaler: &mut S,
    split_year: i32,
    lag_feature: &str,
) -> Result<TargetStats> {
    let numeric = table.numeric_feature_indices();
    if numeric.is_empty() {
        return Err(PronosticarError::empty_table("scale_numeric"));
    }

    let train_rows: Vec<usize> = (0..table.n_rows())
        .filter(|&i| table.years()[i] < split_year)
        .collect();
    if train_rows.is_empty() {
        return Err(PronosticarError::empty_table("scaler_train_slice"));
    }

    let train_sub = table.x().select_rows(&train_rows).select_columns(&numeric);
    scaler.fit(&train_sub)?;

    let full_sub = table.x().select_columns(&numeric);
    let scaled = scaler.transform(&full_sub)?;
    for i in 0..table.n_rows() {
        for (pos, &j) in numeric.iter().enumerate() {
            table.set_value(i, j, scaled.get(i, pos));
        }
    }

    let lag_pos = numeric
        .iter()
        .position(|&j| table.feature_names()[j] == lag_feature)
        .ok_or_else(|| PronosticarError::missing_column(lag_feature))?;
    Ok(TargetStats {
        mean: scaler.centers()[lag_pos],
        std: scaler.scales()[lag_pos],
    })
}

/// Uniform access to a fitted scaler's per-column center and scale.
trait ScalerStats {
    fn centers(&self) -> &[f32];
    fn scales(&self) -> &[f32];
}

impl ScalerStats for StandardScaler {
    fn centers(&self) -> &[f32] {
        self.mean()
    }
    fn scales(&self) -> &[f32] {
        self.std()
    }
}

impl ScalerStats for RobustScaler {
    fn centers(&self) -> &[f32] {
        self.center()
    }
    fn scales(&self) -> &[f32] {
        self.scale()
    }
}

/// Drops numeric features whose training-period Pearson correlation with
/// the target falls below the threshold. Protected names always survive.
fn correlation_filter(
    table: &FeatureTable,
    split_year: i32,
    threshold: f32,
    protected: &[String],
) -> Result<(FeatureTable, Vec<String>)> {
    let train_rows: Vec<usize> = (0..table.n_rows())
        .filter(|&i| table.years()[i] < split_year)
        .collect();
    if train_rows.is_empty() {
        return Err(PronosticarError::empty_table("correlation_train_slice"));
    }

    let y: Vec<f32> = train_rows.iter().map(|&i| table.target()[i]).collect();
    let y_mean: f32 = y.iter().sum::<f32>() / y.len() as f32;
    let y_dev: Vec<f32> = y.iter().map(|v| v - y_mean).collect();
    let y_ss: f32 = y_dev.iter().map(|v| v * v).sum();

    let mut dropped = Vec::new();
    let mut keep = Vec::new();
    for j in 0..table.n_features() {
        let name = table.feature_names()[j].clone();
        if table.is_categorical(j) || protected.contains(&name) {
            keep.push(name);
            continue;
        }
        let col: Vec<f32> = train_rows.iter().map(|&i| table.value(i, j)).collect();
        let mean: f32 = col.iter().sum::<f32>() / col.len() as f32;
        let ss: f32 = col.iter().map(|v| (v - mean).powi(2)).sum();
        let cov: f32 = col
            .iter()
            .zip(y_dev.iter())
            .map(|(v, yd)| (v - mean) * yd)
            .sum();
        let r = if ss > 1e-12 && y_ss > 1e-12 {
            cov / (ss.sqrt() * y_ss.sqrt())
        } else {
            0.0
        };
        if r.abs() >= threshold {
            keep.push(name);
        } else {
            dropped.push(name);
        }
    }

    if !dropped.is_empty() {
        log::info!("correlation filter dropped {dropped:?}");
    }
    let filtered = table.select_features(&keep)?;
    Ok((filtered, dropped))
}

/// Pipeline for the linear (Ridge) model family.
#[derive(Debug, Clone)]
pub struct LinearPipeline {
    target: String,
    lag_feature: String,
    skewed_cols: Vec<String>,
    outlier: OutlierConfig,
    vif: VifConfig,
    split_year: i32,
}

impl LinearPipeline {
    /// Creates a linear pipeline for the given target and lag column.
    #[must_use]
    pub fn new(target: &str, lag_feature: &str, split_year: i32) -> Self {
        Self {
            target: target.to_string(),
            lag_feature: lag_feature.to_string(),
            skewed_cols: Vec::new(),
            outlier: OutlierConfig::default(),
            vif: VifConfig::default(),
            split_year,
        }
    }

    /// Columns to log1p-transform before encoding.
    #[must_use]
    pub fn with_skewed_columns<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skewed_cols = cols.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides the outlier configuration.
    #[must_use]
    pub fn with_outlier_config(mut self, config: OutlierConfig) -> Self {
        self.outlier = config;
        self
    }

    /// Overrides the VIF configuration. The lag feature is appended to the
    /// protected set regardless.
    #[must_use]
    pub fn with_vif_config(mut self, config: VifConfig) -> Self {
        self.vif = config;
        self
    }

    /// Runs log1p → one-hot → outlier filter → VIF → z-score scaling.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured column is missing, a stage
    /// produces zero rows, or the training slice is empty.
    pub fn run(&self, panel: &Panel) -> Result<PreparedTable> {
        let mut panel = panel.clone();
        let skewed: Vec<&str> = self.skewed_cols.iter().map(String::as_str).collect();
        panel.log1p_columns(&skewed)?;

        let table = assemble_table(&panel, &self.target, &EntityEncoding::OneHot)?;

        let (table, index_map, outlier_report) =
            IqrOutlierFilter::new(self.outlier.clone()).filter(&table)?;

        let mut vif = self.vif.clone();
        if !vif.protected.contains(&self.lag_feature) {
            vif.protected.push(self.lag_feature.clone());
        }
        let (mut table, vif_report) = VifReducer::new(vif).reduce(&table)?;

        let mut scaler = StandardScaler::new();
        let lag_stats =
            scale_numeric(&mut table, &mut scaler, self.split_year, &self.lag_feature)?;

        Ok(PreparedTable {
            table,
            index_map: Some(index_map),
            outlier_report: Some(outlier_report),
            vif_report: Some(vif_report),
            dropped_by_correlation: Vec::new(),
            lag_stats,
        })
    }
}

/// Pipeline for the kernel (SVR) model family.
#[derive(Debug, Clone)]
pub struct KernelPipeline {
    target: String,
    lag_feature: String,
    skewed_cols: Vec<String>,
    correlation_threshold: f32,
    split_year: i32,
}

impl KernelPipeline {
    /// Creates a kernel pipeline for the given target and lag column.
    #[must_use]
    pub fn new(target: &str, lag_feature: &str, split_year: i32) -> Self {
        Self {
            target: target.to_string(),
            lag_feature: lag_feature.to_string(),
            skewed_cols: Vec::new(),
            correlation_threshold: 0.1,
            split_year,
        }
    }

    /// Columns to log1p-transform before encoding.
    #[must_use]
    pub fn with_skewed_columns<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skewed_cols = cols.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the minimum |Pearson r| a feature needs to survive.
    #[must_use]
    pub fn with_correlation_threshold(mut self, threshold: f32) -> Self {
        self.correlation_threshold = threshold;
        self
    }

    /// Runs log1p → one-hot → correlation filter → robust scaling.
    ///
    /// No outlier removal: the robust scaler absorbs extremes instead.
    /// The returned `lag_stats` hold the lag column's median and IQR.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured column is missing or the training
    /// slice is empty.
    pub fn run(&self, panel: &Panel) -> Result<PreparedTable> {
        let mut panel = panel.clone();
        let skewed: Vec<&str> = self.skewed_cols.iter().map(String::as_str).collect();
        panel.log1p_columns(&skewed)?;

        let table = assemble_table(&panel, &self.target, &EntityEncoding::OneHot)?;

        let protected = vec![self.lag_feature.clone()];
        let (mut table, dropped) = correlation_filter(
            &table,
            self.split_year,
            self.correlation_threshold,
            &protected,
        )?;

        let mut scaler = RobustScaler::new();
        let lag_stats =
            scale_numeric(&mut table, &mut scaler, self.split_year, &self.lag_feature)?;

        Ok(PreparedTable {
            table,
            index_map: None,
            outlier_report: None,
            vif_report: None,
            dropped_by_correlation: dropped,
            lag_stats,
        })
    }
}

/// Pipeline for the tree (gradient boosting) model family.
#[derive(Debug, Clone)]
pub struct TreePipeline {
    target: String,
    lag_feature: String,
}

impl TreePipeline {
    /// Creates a tree pipeline for the given target and lag column.
    #[must_use]
    pub fn new(target: &str, lag_feature: &str) -> Self {
        Self {
            target: target.to_string(),
            lag_feature: lag_feature.to_string(),
        }
    }

    /// Runs ordinal encoding only; features stay in raw units.
    ///
    /// The lag statistics are identity: raw predictions are injected
    /// unscaled during recursive forecasting.
    ///
    /// # Errors
    ///
    /// Returns an error if the target or lag column is missing.
    pub fn run(&self, panel: &Panel) -> Result<PreparedTable> {
        let table = assemble_table(panel, &self.target, &EntityEncoding::Ordinal)?;
        if table.feature_index(&self.lag_feature).is_none() {
            return Err(PronosticarError::missing_column(&self.lag_feature));
        }

        Ok(PreparedTable {
            table,
            index_map: None,
            outlier_report: None,
            vif_report: None,
            dropped_by_correlation: Vec::new(),
            lag_stats: TargetStats { mean: 0.0, std: 1.0 },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Panel with 6 entities x 6 years, a lag column, an extreme entity,
    /// and a pair of collinear covariates.
    fn rich_panel() -> Panel {
        let mut entities = Vec::new();
        let mut years = Vec::new();
        let mut co2 = Vec::new();
        let mut gdp = Vec::new();
        let mut gdp_twin = Vec::new();
        let mut flows = Vec::new();

        let profiles: &[(&str, f32)] = &[
            ("Aruba", 1.0),
            ("Bolivia", 2.0),
            ("Chad", 3.0),
            ("Denmark", 4.0),
            ("Estonia", 5.0),
            ("Giant", 5000.0),
        ];
        for (entity, scale) in profiles {
            for year in 2000..2006 {
                let t = (year - 2000) as f32;
                entities.push((*entity).to_string());
                years.push(year);
                co2.push(scale * (10.0 + t));
                gdp.push(scale * (2.0 + 0.1 * t));
                gdp_twin.push(scale * (4.0 + 0.2 * t) + 0.001 * t);
                flows.push(scale * 100.0 + t);
            }
        }

        let mut panel = Panel::new(
            entities,
            years,
            vec![
                ("co2".to_string(), co2),
                ("gdp".to_string(), gdp),
                ("gdp_twin".to_string(), gdp_twin),
                ("flows".to_string(), flows),
            ],
        )
        .expect("panel");
        panel
            .add_lag_features(&["co2"], 1)
            .expect("lags");
        panel
    }

    #[test]
    fn test_linear_pipeline_end_to_end() {
        let panel = rich_panel();
        let pipeline = LinearPipeline::new("co2", "co2_lag1", 2004)
            .with_skewed_columns(["flows"])
            .with_outlier_config(OutlierConfig::default().with_protected(["Giant"]));
        let prepared = pipeline.run(&panel).expect("run");

        // Protected extreme entity fully retained
        let giants = prepared
            .table
            .entities()
            .iter()
            .filter(|e| e.as_str() == "Giant")
            .count();
        assert_eq!(giants, 5); // 6 years minus the lag-dropped first year

        // Lag survived VIF (protected) and its stats are real
        assert!(prepared.table.feature_index("co2_lag1").is_some());
        assert!(prepared.lag_stats.std > 0.0);

        // One-hot columns exist and are flagged categorical
        let idx = prepared
            .table
            .feature_index("Entity_Giant")
            .expect("one-hot col");
        assert!(prepared.table.is_categorical(idx));

        // Index map and reports present
        assert!(prepared.index_map.is_some());
        assert!(prepared.outlier_report.is_some());
        assert!(prepared.vif_report.is_some());
    }

    #[test]
    fn test_linear_pipeline_scales_with_train_statistics() {
        let panel = rich_panel();
        let pipeline = LinearPipeline::new("co2", "co2_lag1", 2004)
            .with_outlier_config(OutlierConfig::default().with_protected(["Giant"]));
        let prepared = pipeline.run(&panel).expect("run");

        // Reconstruct: scaled lag * std + mean must equal the raw lag of a
        // training row. Use a Giant row (protected, surely retained).
        let table = &prepared.table;
        let lag_idx = table.feature_index("co2_lag1").expect("lag");
        let row = (0..table.n_rows())
            .find(|&i| table.entities()[i] == "Giant" && table.years()[i] == 2002)
            .expect("giant 2002 row");
        let unscaled = prepared.lag_stats.unscale(table.value(row, lag_idx));
        // co2 of Giant in 2001 = 5000 * 11
        assert!((unscaled - 55_000.0).abs() / 55_000.0 < 1e-3);
    }

    #[test]
    fn test_kernel_pipeline_keeps_protected_lag_and_scales_robustly() {
        let panel = rich_panel();
        let pipeline = KernelPipeline::new("co2", "co2_lag1", 2004)
            .with_correlation_threshold(0.05);
        let prepared = pipeline.run(&panel).expect("run");

        assert!(prepared.table.feature_index("co2_lag1").is_some());
        assert!(prepared.index_map.is_none());
        assert!(prepared.outlier_report.is_none());
        // Robust stats: scale is an IQR, strictly positive here
        assert!(prepared.lag_stats.std > 0.0);
    }

    #[test]
    fn test_tree_pipeline_raw_units_and_ordinal_code() {
        let panel = rich_panel();
        let pipeline = TreePipeline::new("co2", "co2_lag1");
        let prepared = pipeline.run(&panel).expect("run");

        // Entity code column is categorical, single column
        let code_idx = prepared
            .table
            .feature_index(ENTITY_CODE)
            .expect("entity code");
        assert!(prepared.table.is_categorical(code_idx));

        // No scaling: lag values remain in raw units, stats are identity
        assert!((prepared.lag_stats.mean - 0.0).abs() < f32::EPSILON);
        assert!((prepared.lag_stats.std - 1.0).abs() < f32::EPSILON);
        let lag_idx = prepared.table.feature_index("co2_lag1").expect("lag");
        let row = (0..prepared.table.n_rows())
            .find(|&i| {
                prepared.table.entities()[i] == "Giant" && prepared.table.years()[i] == 2002
            })
            .expect("giant row");
        assert!((prepared.table.value(row, lag_idx) - 55_000.0).abs() < 1.0);
    }

    #[test]
    fn test_linear_pipeline_missing_skewed_column_errors() {
        let panel = rich_panel();
        let pipeline =
            LinearPipeline::new("co2", "co2_lag1", 2004).with_skewed_columns(["not_there"]);
        assert!(pipeline.run(&panel).is_err());
    }

    #[test]
    fn test_pipelines_preserve_provenance() {
        let panel = rich_panel();
        let pipeline = LinearPipeline::new("co2", "co2_lag1", 2004)
            .with_outlier_config(OutlierConfig::default().with_protected(["Giant"]));
        let prepared = pipeline.run(&panel).expect("run");

        // Every surviving row's id exists in the source panel with the same
        // entity and year
        let mut by_id = std::collections::HashMap::new();
        for i in 0..panel.n_rows() {
            by_id.insert(panel.row_ids()[i], (panel.entities()[i].clone(), panel.years()[i]));
        }
        for i in 0..prepared.table.n_rows() {
            let (entity, year) = by_id
                .get(&prepared.table.row_ids()[i])
                .expect("row id traceable");
            assert_eq!(entity, &prepared.table.entities()[i]);
            assert_eq!(*year, prepared.table.years()[i]);
        }
    }
}
