//! Chronology-aware model selection.
//!
//! The headline evaluation protocol is a single chronological split; the
//! helpers here exist for hyperparameter tuning inside the training years
//! (expanding-window folds) and for an explicitly-labeled random-split
//! diagnostic.

use crate::data::FeatureTable;
use crate::error::{PronosticarError, Result};
use crate::linear_model::Ridge;
use crate::traits::Estimator;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Expanding-window splitter over the panel's year axis.
///
/// The distinct years are cut into `n_splits + 1` consecutive blocks;
/// fold i trains on blocks `0..=i` and validates on block `i + 1`, so
/// validation years always lie strictly after training years.
#[derive(Debug, Clone)]
pub struct TimeSeriesSplit {
    n_splits: usize,
}

impl TimeSeriesSplit {
    /// Creates a splitter with the given number of folds.
    #[must_use]
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits: n_splits.max(1),
        }
    }

    /// Produces (train row indices, validation row indices) per fold.
    ///
    /// # Errors
    ///
    /// Returns an error if the table has fewer distinct years than
    /// `n_splits + 1`.
    pub fn split(&self, table: &FeatureTable) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        let years = table.distinct_years();
        if years.len() < self.n_splits + 1 {
            return Err(PronosticarError::InvalidHyperparameter {
                param: "n_splits".to_string(),
                value: self.n_splits.to_string(),
                constraint: format!("at most {} (distinct years - 1)", years.len() - 1),
            });
        }

        // Block boundaries over the year axis, later blocks absorb the
        // remainder
        let n_blocks = self.n_splits + 1;
        let base = years.len() / n_blocks;
        let extra = years.len() % n_blocks;
        let mut blocks: Vec<&[i32]> = Vec::with_capacity(n_blocks);
        let mut start = 0;
        for b in 0..n_blocks {
            let len = base + usize::from(b < extra);
            blocks.push(&years[start..start + len]);
            start += len;
        }

        let mut folds = Vec::with_capacity(self.n_splits);
        for i in 0..self.n_splits {
            let last_train_year = *blocks[i].last().expect("non-empty block");
            let val_years = blocks[i + 1];
            let train: Vec<usize> = (0..table.n_rows())
                .filter(|&r| table.years()[r] <= last_train_year)
                .collect();
            let val: Vec<usize> = (0..table.n_rows())
                .filter(|&r| val_years.contains(&table.years()[r]))
                .collect();
            folds.push((train, val));
        }
        Ok(folds)
    }
}

/// Mean validation R² per alpha, best-first selection.
#[derive(Debug, Clone)]
pub struct AlphaSearchResult {
    /// The alpha with the highest mean validation R².
    pub best_alpha: f32,
    /// (alpha, mean R²) in the order searched.
    pub scores: Vec<(f32, f32)>,
}

/// Grid-searches the Ridge regularization strength over expanding-window
/// folds.
///
/// Call this on the training slice only; validation years inside the
/// folds still precede the held-out evaluation years.
///
/// # Errors
///
/// Returns an error if the candidate list is empty, the splitter cannot
/// produce folds, or a fit fails on every fold of an alpha.
pub fn grid_search_ridge_alpha(
    table: &FeatureTable,
    alphas: &[f32],
    n_splits: usize,
) -> Result<AlphaSearchResult> {
    if alphas.is_empty() {
        return Err(PronosticarError::InvalidHyperparameter {
            param: "alphas".to_string(),
            value: "[]".to_string(),
            constraint: "at least one candidate".to_string(),
        });
    }

    let folds = TimeSeriesSplit::new(n_splits).split(table)?;

    let mut scores = Vec::with_capacity(alphas.len());
    for &alpha in alphas {
        let mut total = 0.0;
        let mut n_scored = 0;
        for (train_idx, val_idx) in &folds {
            let train = table.select_rows(train_idx);
            let val = table.select_rows(val_idx);
            let mut model = Ridge::new(alpha);
            if model.fit(train.x(), train.target()).is_err() {
                continue; // singular fold at alpha = 0; score the rest
            }
            total += model.score(val.x(), val.target());
            n_scored += 1;
        }
        if n_scored == 0 {
            return Err(PronosticarError::ConvergenceFailure {
                iterations: folds.len(),
                final_loss: f32::NAN,
            });
        }
        scores.push((alpha, total / n_scored as f32));
    }

    let best_alpha = scores
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .expect("non-empty scores")
        .0;

    log::info!("alpha search: best {best_alpha} of {scores:?}");
    Ok(AlphaSearchResult { best_alpha, scores })
}

/// Random row split, for diagnostics only.
///
/// A random split leaks future information into training through
/// correlated entity-level features and is the wrong protocol for panel
/// forecasting. It exists as a comparison baseline; never report its
/// numbers as the headline accuracy.
#[must_use]
pub fn diagnostic_random_split(
    table: &FeatureTable,
    test_fraction: f32,
    seed: u64,
) -> (FeatureTable, FeatureTable) {
    log::warn!(
        "diagnostic_random_split: random splits leak future years into training; \
         use the chronological split for reported numbers"
    );
    let n = table.n_rows();
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    for i in (1..n).rev() {
        let j = rng.random_range(0..=i);
        order.swap(i, j);
    }
    let n_test = ((n as f32 * test_fraction).round() as usize).min(n);
    let test: Vec<usize> = order[..n_test].to_vec();
    let train: Vec<usize> = order[n_test..].to_vec();
    (table.select_rows(&train), table.select_rows(&test))
}
