//! Entity profiling and static cluster assignment.
//!
//! Cluster-based training partitions entities into a small number of
//! groups by their development profile (GDP per capita, electricity
//! access, renewable share, energy use). Profiles are aggregated strictly
//! over training years: the assignment is a versioned artifact computed
//! once and passed to every consumer, never recomputed with a different
//! data cut. Recomputing with post-split rows would leak test information
//! into the model partition.

use super::KMeans;
use crate::error::{PronosticarError, Result};
use crate::panel::Panel;
use crate::preprocessing::StandardScaler;
use crate::primitives::Matrix;
use crate::traits::{Transformer, UnsupervisedEstimator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Static entity → cluster mapping.
///
/// Valid for every year of an entity's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterAssignment {
    assignments: BTreeMap<String, usize>,
    n_clusters: usize,
}

impl ClusterAssignment {
    /// Cluster id for an entity, if it was profiled.
    #[must_use]
    pub fn get(&self, entity: &str) -> Option<usize> {
        self.assignments.get(entity).copied()
    }

    /// Number of clusters.
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Number of assigned entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Returns true if no entity was assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Entity count per cluster.
    #[must_use]
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &c in self.assignments.values() {
            sizes[c] += 1;
        }
        sizes
    }
}

/// What the clusterer could and could not profile.
#[derive(Debug, Clone)]
pub struct ClusterReport {
    /// Entity count per cluster.
    pub cluster_sizes: Vec<usize>,
    /// Entities without a usable training-period profile. They drop out of
    /// clustered evaluation; counted, not fatal.
    pub unprofiled_entities: Vec<String>,
}

impl fmt::Display for ClusterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cluster sizes {:?}, {} entities unprofiled",
            self.cluster_sizes,
            self.unprofiled_entities.len()
        )
    }
}

/// Builds a [`ClusterAssignment`] from training-period entity profiles.
#[derive(Debug, Clone)]
pub struct EntityClusterer {
    profile_cols: Vec<String>,
    n_clusters: usize,
    split_year: i32,
    random_state: Option<u64>,
}

impl EntityClusterer {
    /// Creates a clusterer over the given profile columns.
    ///
    /// Only rows with `year < split_year` contribute to the profiles.
    #[must_use]
    pub fn new(profile_cols: &[&str], split_year: i32) -> Self {
        Self {
            profile_cols: profile_cols.iter().map(|s| (*s).to_string()).collect(),
            n_clusters: 3,
            split_year,
            random_state: None,
        }
    }

    /// Sets the cluster count (default 3).
    #[must_use]
    pub fn with_n_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters;
        self
    }

    /// Sets the k-means seed.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Profiles entities and clusters the standardized profiles.
    ///
    /// # Errors
    ///
    /// Returns an error if a profile column is missing or fewer entities
    /// have usable profiles than there are clusters.
    pub fn fit(&self, panel: &Panel) -> Result<(ClusterAssignment, ClusterReport)> {
        for col in &self.profile_cols {
            panel.column(col)?; // fail fast on a typo'd column
        }

        // entity -> (per-column sum, per-column count) over training years
        let p = self.profile_cols.len();
        let mut sums: BTreeMap<&str, (Vec<f64>, Vec<usize>)> = BTreeMap::new();
        let columns: Vec<&[f32]> = self
            .profile_cols
            .iter()
            .map(|c| panel.column(c))
            .collect::<Result<_>>()?;

        for i in 0..panel.n_rows() {
            let entry = sums
                .entry(panel.entities()[i].as_str())
                .or_insert_with(|| (vec![0.0; p], vec![0; p]));
            if panel.years()[i] >= self.split_year {
                continue; // test years never touch the profile
            }
            for (j, col) in columns.iter().enumerate() {
                let v = col[i];
                if !v.is_nan() {
                    entry.0[j] += f64::from(v);
                    entry.1[j] += 1;
                }
            }
        }

        let mut profiled: Vec<&str> = Vec::new();
        let mut unprofiled: Vec<String> = Vec::new();
        let mut data: Vec<f32> = Vec::new();
        for (entity, (col_sums, col_counts)) in &sums {
            if col_counts.iter().any(|&c| c == 0) {
                unprofiled.push((*entity).to_string());
                continue;
            }
            profiled.push(*entity);
            for j in 0..p {
                data.push((col_sums[j] / col_counts[j] as f64) as f32);
            }
        }

        if profiled.len() < self.n_clusters {
            return Err(PronosticarError::InvalidHyperparameter {
                param: "n_clusters".to_string(),
                value: self.n_clusters.to_string(),
                constraint: format!("at most {} profiled entities", profiled.len()),
            });
        }

        let profiles = Matrix::from_vec(profiled.len(), p, data)
            .map_err(PronosticarError::from)?;

        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&profiles)?;

        let mut kmeans = KMeans::new(self.n_clusters)
            .with_random_state(self.random_state.unwrap_or(0));
        kmeans.fit(&scaled)?;
        let labels = kmeans.labels();

        let assignments: BTreeMap<String, usize> = profiled
            .iter()
            .zip(labels.iter())
            .map(|(e, &l)| ((*e).to_string(), l))
            .collect();

        let assignment = ClusterAssignment {
            assignments,
            n_clusters: self.n_clusters,
        };
        let report = ClusterReport {
            cluster_sizes: assignment.cluster_sizes(),
            unprofiled_entities: unprofiled,
        };

        log::info!("entity clustering: {report}");
        Ok((assignment, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three groups of entities with well-separated profile levels, plus
    /// one entity observed only after the split.
    fn profiled_panel() -> Panel {
        let mut entities = Vec::new();
        let mut years = Vec::new();
        let mut gdp = Vec::new();
        let mut access = Vec::new();

        let groups: &[(&str, f32)] = &[
            ("Poor1", 1.0),
            ("Poor2", 1.0),
            ("Mid1", 50.0),
            ("Mid2", 50.0),
            ("Rich1", 500.0),
            ("Rich2", 500.0),
        ];
        for (name, level) in groups {
            for year in 2000..2004 {
                entities.push((*name).to_string());
                years.push(year);
                gdp.push(*level);
                access.push(level * 0.1);
            }
        }
        // Entity with no training-period rows
        entities.push("LateComer".to_string());
        years.push(2010);
        gdp.push(100.0);
        access.push(10.0);

        Panel::new(
            entities,
            years,
            vec![("gdp".to_string(), gdp), ("access".to_string(), access)],
        )
        .expect("panel")
    }

    #[test]
    fn test_groups_cluster_together() {
        let panel = profiled_panel();
        let clusterer = EntityClusterer::new(&["gdp", "access"], 2005).with_random_state(3);
        let (assignment, report) = clusterer.fit(&panel).expect("fit");

        assert_eq!(assignment.n_clusters(), 3);
        assert_eq!(assignment.len(), 6);
        assert_eq!(
            assignment.get("Poor1").expect("assigned"),
            assignment.get("Poor2").expect("assigned")
        );
        assert_eq!(
            assignment.get("Rich1").expect("assigned"),
            assignment.get("Rich2").expect("assigned")
        );
        assert_ne!(
            assignment.get("Poor1").expect("assigned"),
            assignment.get("Rich1").expect("assigned")
        );
        assert_eq!(report.cluster_sizes.iter().sum::<usize>(), 6);
    }

    #[test]
    fn test_post_split_only_entity_is_unprofiled() {
        let panel = profiled_panel();
        let clusterer = EntityClusterer::new(&["gdp", "access"], 2005).with_random_state(3);
        let (assignment, report) = clusterer.fit(&panel).expect("fit");

        assert!(assignment.get("LateComer").is_none());
        assert_eq!(report.unprofiled_entities, vec!["LateComer".to_string()]);
    }

    #[test]
    fn test_assignment_static_across_years() {
        // The assignment is keyed on entity alone; asking for the same
        // entity is year-independent by construction.
        let panel = profiled_panel();
        let clusterer = EntityClusterer::new(&["gdp", "access"], 2005).with_random_state(3);
        let (assignment, _) = clusterer.fit(&panel).expect("fit");
        let first = assignment.get("Mid1");
        assert_eq!(first, assignment.get("Mid1"));
    }

    #[test]
    fn test_missing_profile_column_errors() {
        let panel = profiled_panel();
        let clusterer = EntityClusterer::new(&["gdp", "typo"], 2005);
        assert!(clusterer.fit(&panel).is_err());
    }

    #[test]
    fn test_too_few_profiled_entities_errors() {
        let panel = profiled_panel();
        let clusterer = EntityClusterer::new(&["gdp"], 2005).with_n_clusters(10);
        assert!(matches!(
            clusterer.fit(&panel),
            Err(PronosticarError::InvalidHyperparameter { .. })
        ));
    }

    #[test]
    fn test_serde_round_trip() {
        let panel = profiled_panel();
        let clusterer = EntityClusterer::new(&["gdp", "access"], 2005).with_random_state(3);
        let (assignment, _) = clusterer.fit(&panel).expect("fit");

        let json = serde_json::to_string(&assignment).expect("serialize");
        let restored: ClusterAssignment = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.get("Poor1"), assignment.get("Poor1"));
        assert_eq!(restored.n_clusters(), assignment.n_clusters());
    }
}
