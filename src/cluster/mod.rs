//! Clustering: K-Means and training-period entity profiling.

mod kmeans;
mod profile;

pub use kmeans::KMeans;
pub use profile::{ClusterAssignment, ClusterReport, EntityClusterer};
