//! Pronosticar: panel-data CO2 emissions forecasting in pure Rust.
//!
//! Pronosticar estimates national CO2 emissions from a country × year
//! panel with linear (Ridge), kernel (SVR), and tree-based (gradient
//! boosting) regressors, plus a trend + residual hybrid. Its core is the
//! leakage-aware preprocessing and evaluation procedure: per-algorithm
//! feature pipelines, whitelist-protected outlier removal, VIF reduction,
//! a chronological train split, and a recursive multi-step forecaster that
//! feeds each year's prediction back in as the next year's lag feature.
//!
//! # Quick Start
//!
//! ```
//! use pronosticar::prelude::*;
//!
//! // Training data (y = 2*x + 1)
//! let x = Matrix::from_vec(4, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let y = Vector::from_slice(&[3.0, 5.0, 7.0, 9.0]);
//!
//! let mut model = Ridge::new(0.1);
//! model.fit(&x, &y).unwrap();
//! assert!(model.score(&x, &y) > 0.99);
//! ```
//!
//! # Modules
//!
//! - [`primitives`]: Core Vector and Matrix types
//! - [`panel`]: (entity, year) table with immutable row provenance
//! - [`data`]: algorithm-ready `FeatureTable`
//! - [`preprocessing`]: scalers, encoders, outlier filter, VIF reducer
//! - [`pipeline`]: per-model feature pipelines (linear/kernel/tree)
//! - [`linear_model`]: Ridge regression
//! - [`svm`]: epsilon-insensitive support vector regression
//! - [`tree`]: regression trees and gradient boosting
//! - [`cluster`]: K-Means and training-period entity profiling
//! - [`model`]: trainers, the hybrid, and the trained-model artifact
//! - [`model_selection`]: expanding-window folds and alpha search
//! - [`forecast`]: recursive forecasting and teacher forcing
//! - [`metrics`]: R², RMSE, MAE, macro-averaged MAPE

pub mod cluster;
pub mod data;
pub mod error;
pub mod forecast;
pub mod linear_model;
pub mod metrics;
pub mod model;
pub mod model_selection;
pub mod panel;
pub mod pipeline;
pub mod prelude;
pub mod preprocessing;
pub mod primitives;
pub mod svm;
pub mod traits;
pub mod tree;

pub use error::{PronosticarError, Result};
pub use primitives::{Matrix, Vector};
pub use traits::{Estimator, Transformer, UnsupervisedEstimator};
