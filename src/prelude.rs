//! Convenience re-exports for common usage.

pub use crate::cluster::{ClusterAssignment, EntityClusterer, KMeans};
pub use crate::data::FeatureTable;
pub use crate::error::{PronosticarError, Result};
pub use crate::forecast::{ModelSet, RecursiveForecaster};
pub use crate::linear_model::Ridge;
pub use crate::model::{AnyRegressor, HybridRegressor, ModelArtifact, TargetStats};
pub use crate::panel::{Panel, PanelReader};
pub use crate::primitives::{Matrix, Vector};
pub use crate::traits::{Estimator, Transformer, UnsupervisedEstimator};
pub use crate::tree::{DecisionTreeRegressor, GradientBoostingRegressor};
