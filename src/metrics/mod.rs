//! Evaluation metrics for the forecasting models.
//!
//! Includes regression metrics (R², MSE, RMSE, MAE) and the panel-aware
//! macro-averaged MAPE, which averages percentage errors within each
//! entity first and only then across entities.

use crate::primitives::Vector;
use std::collections::BTreeMap;
use std::fmt;

/// Computes the coefficient of determination (R²).
///
/// R² = 1 - (`SS_res` / `SS_tot`)
///
/// where `SS_res` is the residual sum of squares and `SS_tot` is the total
/// sum of squares.
///
/// # Examples
///
/// ```
/// use pronosticar::metrics::r_squared;
/// use pronosticar::primitives::Vector;
///
/// let y_true = Vector::from_slice(&[3.0, -0.5, 2.0, 7.0]);
/// let y_pred = Vector::from_slice(&[2.5, 0.0, 2.0, 8.0]);
/// let r2 = r_squared(&y_pred, &y_true);
/// assert!(r2 > 0.9);
/// ```
///
/// # Panics
///
/// Panics if vectors have different lengths.
#[must_use]
pub fn r_squared(y_pred: &Vector<f32>, y_true: &Vector<f32>) -> f32 {
    assert_eq!(y_pred.len(), y_true.len(), "Vectors must have same length");

    let y_mean = y_true.mean();

    let ss_res: f32 = y_true
        .as_slice()
        .iter()
        .zip(y_pred.as_slice().iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();

    let ss_tot: f32 = y_true.as_slice().iter().map(|t| (t - y_mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return 0.0;
    }

    1.0 - (ss_res / ss_tot)
}

/// Computes the Mean Squared Error (MSE).
///
/// # Panics
///
/// Panics if vectors have different lengths or are empty.
#[must_use]
pub fn mse(y_pred: &Vector<f32>, y_true: &Vector<f32>) -> f32 {
    assert_eq!(y_pred.len(), y_true.len(), "Vectors must have same length");
    assert!(!y_true.is_empty(), "Vectors cannot be empty");

    let n = y_true.len() as f32;

    let sum_sq_error: f32 = y_true
        .as_slice()
        .iter()
        .zip(y_pred.as_slice().iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();

    sum_sq_error / n
}

/// Computes the Root Mean Squared Error (RMSE).
///
/// # Panics
///
/// Panics if vectors have different lengths or are empty.
#[must_use]
pub fn rmse(y_pred: &Vector<f32>, y_true: &Vector<f32>) -> f32 {
    mse(y_pred, y_true).sqrt()
}

/// Computes the Mean Absolute Error (MAE).
///
/// # Panics
///
/// Panics if vectors have different lengths or are empty.
#[must_use]
pub fn mae(y_pred: &Vector<f32>, y_true: &Vector<f32>) -> f32 {
    assert_eq!(y_pred.len(), y_true.len(), "Vectors must have same length");
    assert!(!y_true.is_empty(), "Vectors cannot be empty");

    let n = y_true.len() as f32;

    let sum_abs_error: f32 = y_true
        .as_slice()
        .iter()
        .zip(y_pred.as_slice().iter())
        .map(|(t, p)| (t - p).abs())
        .sum();

    sum_abs_error / n
}

/// Macro-averaged MAPE over a panel of entities.
///
/// Percentage errors are averaged within each entity first, then summarized
/// across entities. The median is the primary number: a flat MAPE over all
/// rows would overweight entities with many observations and be driven by
/// near-zero-emission micro-states whose percentage errors explode.
#[derive(Debug, Clone)]
pub struct MacroMape {
    /// Mean absolute percentage error per entity, sorted by entity name.
    pub per_entity: Vec<(String, f32)>,
    /// Median of the per-entity MAPEs (primary, robust to micro-states).
    pub median: f32,
    /// Mean of the per-entity MAPEs (secondary, inflated by micro-states).
    pub mean: f32,
    /// Rows excluded because |actual| fell below the epsilon cutoff.
    pub excluded_rows: usize,
}

impl fmt::Display for MacroMape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "macro-MAPE over {} entities: median {:.2}%, mean {:.2}% ({} near-zero rows excluded)",
            self.per_entity.len(),
            self.median,
            self.mean,
            self.excluded_rows
        )
    }
}

/// Computes the macro-averaged MAPE.
///
/// Rows where `|actual| < epsilon` are excluded from the per-entity mean
/// and counted in [`MacroMape::excluded_rows`]. Entities whose rows are all
/// excluded contribute no per-entity value.
///
/// # Panics
///
/// Panics if the three inputs have different lengths.
#[must_use]
pub fn macro_mape(
    y_pred: &Vector<f32>,
    y_true: &Vector<f32>,
    entities: &[String],
    epsilon: f32,
) -> MacroMape {
    assert_eq!(y_pred.len(), y_true.len(), "Vectors must have same length");
    assert_eq!(
        y_true.len(),
        entities.len(),
        "Entities must align with observations"
    );

    // BTreeMap for deterministic entity ordering
    let mut sums: BTreeMap<&str, (f32, usize)> = BTreeMap::new();
    let mut excluded_rows = 0;

    for i in 0..y_true.len() {
        let actual = y_true[i];
        if actual.abs() < epsilon {
            excluded_rows += 1;
            continue;
        }
        let ape = (actual - y_pred[i]).abs() / actual.abs() * 100.0;
        let entry = sums.entry(entities[i].as_str()).or_insert((0.0, 0));
        entry.0 += ape;
        entry.1 += 1;
    }

    let per_entity: Vec<(String, f32)> = sums
        .into_iter()
        .map(|(entity, (sum, count))| (entity.to_string(), sum / count as f32))
        .collect();

    let mut values: Vec<f32> = per_entity.iter().map(|(_, v)| *v).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let median = if values.is_empty() {
        0.0
    } else if values.len() % 2 == 0 {
        (values[values.len() / 2 - 1] + values[values.len() / 2]) / 2.0
    } else {
        values[values.len() / 2]
    };

    let mean = if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    };

    MacroMape {
        per_entity,
        median,
        mean,
        excluded_rows,
    }
}
