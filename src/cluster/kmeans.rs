//! K-Means clustering algorithm.
//!
//! Uses Lloyd's algorithm with k-means++ initialization for faster
//! convergence.

use crate::error::{PronosticarError, Result};
use crate::primitives::Matrix;
use crate::traits::UnsupervisedEstimator;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// K-Means clustering algorithm.
///
/// # Algorithm
///
/// 1. Initialize centroids using k-means++
/// 2. Assign each sample to nearest centroid
/// 3. Update centroids as mean of assigned samples
/// 4. Repeat until convergence or max iterations
///
/// # Examples
///
/// ```
/// use pronosticar::prelude::*;
///
/// let data = Matrix::from_vec(6, 2, vec![
///     1.0, 2.0,
///     1.5, 1.8,
///     5.0, 8.0,
///     8.0, 8.0,
///     1.0, 0.6,
///     9.0, 11.0,
/// ]).expect("valid matrix dimensions");
///
/// let mut kmeans = KMeans::new(2).with_random_state(42);
/// kmeans.fit(&data).expect("fit succeeds with valid data");
/// let labels = kmeans.predict(&data);
/// assert_eq!(labels.len(), 6);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    /// Number of clusters.
    n_clusters: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Convergence tolerance on centroid movement.
    tol: f32,
    /// Random seed for initialization.
    random_state: Option<u64>,
    /// Cluster centroids after fitting.
    centroids: Option<Matrix<f32>>,
    /// Labels for training data.
    labels: Option<Vec<usize>>,
    /// Sum of squared distances to assigned centroids.
    inertia: f32,
    /// Number of iterations run.
    n_iter: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::new(3)
    }
}

impl KMeans {
    /// Creates a K-Means model with the given cluster count.
    #[must_use]
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 300,
            tol: 1e-4,
            random_state: None,
            centroids: None,
            labels: None,
            inertia: 0.0,
            n_iter: 0,
        }
    }

    /// Sets the iteration budget.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the convergence tolerance.
    #[must_use]
    pub fn with_tol(mut self, tol: f32) -> Self {
        self.tol = tol;
        self
    }

    /// Sets the initialization seed for reproducible fits.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Returns the fitted centroids.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn centroids(&self) -> &Matrix<f32> {
        self.centroids
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Returns the training labels.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        self.labels
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Returns the within-cluster sum of squares.
    #[must_use]
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    /// Returns the number of Lloyd iterations run.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn sq_dist(x: &Matrix<f32>, row: usize, centroids: &Matrix<f32>, c: usize) -> f32 {
        let mut dist = 0.0;
        for j in 0..x.n_cols() {
            let d = x.get(row, j) - centroids.get(c, j);
            dist += d * d;
        }
        dist
    }

    /// k-means++ seeding: each new centroid is drawn with probability
    /// proportional to the squared distance from the nearest chosen one.
    fn init_centroids(&self, x: &Matrix<f32>, rng: &mut StdRng) -> Matrix<f32> {
        let (n, p) = x.shape();
        let mut chosen: Vec<usize> = Vec::with_capacity(self.n_clusters);
        chosen.push(rng.random_range(0..n));

        while chosen.len() < self.n_clusters {
            let dists: Vec<f32> = (0..n)
                .map(|i| {
                    chosen
                        .iter()
                        .map(|&c| {
                            let mut d = 0.0;
                            for j in 0..p {
                                let diff = x.get(i, j) - x.get(c, j);
                                d += diff * diff;
                            }
                            d
                        })
                        .fold(f32::INFINITY, f32::min)
                })
                .collect();

            let total: f32 = dists.iter().sum();
            if total <= 0.0 {
                // All remaining points coincide with a centroid
                chosen.push(rng.random_range(0..n));
                continue;
            }
            let mut draw = rng.random_range(0.0..total);
            let mut pick = n - 1;
            for (i, &d) in dists.iter().enumerate() {
                if draw < d {
                    pick = i;
                    break;
                }
                draw -= d;
            }
            chosen.push(pick);
        }

        let mut data = Vec::with_capacity(self.n_clusters * p);
        for &c in &chosen {
            for j in 0..p {
                data.push(x.get(c, j));
            }
        }
        Matrix::from_vec(self.n_clusters, p, data).expect("centroid matrix")
    }
}

impl UnsupervisedEstimator for KMeans {
    type Labels = Vec<usize>;

    /// Runs Lloyd's algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is empty or has fewer rows than
    /// clusters.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let (n, p) = x.shape();
        if n == 0 {
            return Err(PronosticarError::empty_table("kmeans_fit"));
        }
        if n < self.n_clusters {
            return Err(PronosticarError::InvalidHyperparameter {
                param: "n_clusters".to_string(),
                value: self.n_clusters.to_string(),
                constraint: format!("at most the number of samples ({n})"),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut centroids = self.init_centroids(x, &mut rng);
        let mut labels = vec![0usize; n];

        let mut iterations = 0;
        for iter in 0..self.max_iter {
            iterations = iter + 1;

            for (i, label) in labels.iter_mut().enumerate() {
                let mut best = 0;
                let mut best_dist = f32::INFINITY;
                for c in 0..self.n_clusters {
                    let d = Self::sq_dist(x, i, &centroids, c);
                    if d < best_dist {
                        best_dist = d;
                        best = c;
                    }
                }
                *label = best;
            }

            let mut sums = vec![0.0f32; self.n_clusters * p];
            let mut counts = vec![0usize; self.n_clusters];
            for (i, &label) in labels.iter().enumerate() {
                counts[label] += 1;
                for j in 0..p {
                    sums[label * p + j] += x.get(i, j);
                }
            }

            let mut shift = 0.0f32;
            for c in 0..self.n_clusters {
                if counts[c] == 0 {
                    continue; // empty cluster keeps its centroid
                }
                for j in 0..p {
                    let new = sums[c * p + j] / counts[c] as f32;
                    let d = new - centroids.get(c, j);
                    shift += d * d;
                    centroids.set(c, j, new);
                }
            }

            if shift.sqrt() < self.tol {
                break;
            }
        }

        let inertia: f32 = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| Self::sq_dist(x, i, &centroids, label))
            .sum();

        self.centroids = Some(centroids);
        self.labels = Some(labels);
        self.inertia = inertia;
        self.n_iter = iterations;
        Ok(())
    }

    /// Assigns each row to its nearest centroid.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    fn predict(&self, x: &Matrix<f32>) -> Vec<usize> {
        let centroids = self.centroids();
        (0..x.n_rows())
            .map(|i| {
                let mut best = 0;
                let mut best_dist = f32::INFINITY;
                for c in 0..self.n_clusters {
                    let d = Self::sq_dist(x, i, centroids, c);
                    if d < best_dist {
                        best_dist = d;
                        best = c;
                    }
                }
                best
            })
            .collect()
    }
}
