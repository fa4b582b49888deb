//! Regression trees (CART) for the tree-based pipeline.
//!
//! Trees consume the ordinal-encoded, unscaled feature table: split-based
//! learners are invariant to monotone transforms, so the log/scale steps
//! of the linear and kernel pipelines would be wasted work here.

mod gradient_boosting;

pub use gradient_boosting::GradientBoostingRegressor;

use crate::error::{PronosticarError, Result};
use crate::primitives::{Matrix, Vector};
use serde::{Deserialize, Serialize};

/// Leaf node in a regression tree.
///
/// Contains the predicted value (mean of training samples) and the number
/// of training samples that reached this leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionLeaf {
    /// Predicted value for this leaf (mean of y values)
    pub value: f32,
    /// Number of training samples in this leaf
    pub n_samples: usize,
}

/// Internal node in a regression tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionNode {
    /// Index of the feature to split on
    pub feature_idx: usize,
    /// Threshold value for the split
    pub threshold: f32,
    /// Left subtree (samples where feature <= threshold)
    pub left: Box<RegressionTreeNode>,
    /// Right subtree (samples where feature > threshold)
    pub right: Box<RegressionTreeNode>,
}

/// A node in a regression tree (either internal node or leaf).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegressionTreeNode {
    /// Internal decision node with split condition
    Node(RegressionNode),
    /// Leaf node with value prediction
    Leaf(RegressionLeaf),
}

impl RegressionTreeNode {
    /// Returns the depth of the tree rooted at this node.
    ///
    /// Leaf nodes have depth 0, internal nodes 1 + max(left, right).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            RegressionTreeNode::Leaf(_) => 0,
            RegressionTreeNode::Node(node) => 1 + node.left.depth().max(node.right.depth()),
        }
    }
}

/// Decision tree regressor using the CART algorithm.
///
/// Splits minimize the weighted sum of squared errors; leaves predict the
/// mean of their training targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    tree: Option<RegressionTreeNode>,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTreeRegressor {
    /// Creates a new decision tree regressor with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }

    /// Sets the maximum depth of the tree.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Sets the minimum number of samples required to split a node.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Sets the minimum number of samples required at a leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Returns true if the tree has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.tree.is_some()
    }

    /// Fits the decision tree to training data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is empty or lengths mismatch.
    pub fn fit(&mut self, x: &Matrix<f32>, y: &Vector<f32>) -> Result<()> {
        let (n_rows, _) = x.shape();
        if n_rows != y.len() {
            return Err(PronosticarError::DimensionMismatch {
                expected: format!("{n_rows} targets"),
                actual: format!("{}", y.len()),
            });
        }
        if n_rows == 0 {
            return Err(PronosticarError::empty_table("tree_fit"));
        }

        let indices: Vec<usize> = (0..n_rows).collect();
        self.tree = Some(build_regression_tree(
            x,
            y,
            &indices,
            0,
            self.max_depth,
            self.min_samples_split,
            self.min_samples_leaf,
        ));
        Ok(())
    }

    /// Predicts target values for samples.
    ///
    /// # Panics
    ///
    /// Panics if called before fit().
    #[must_use]
    pub fn predict(&self, x: &Matrix<f32>) -> Vector<f32> {
        let (n_samples, n_features) = x.shape();
        let mut predictions = Vec::with_capacity(n_samples);

        for row in 0..n_samples {
            let mut sample = Vec::with_capacity(n_features);
            for col in 0..n_features {
                sample.push(x.get(row, col));
            }
            predictions.push(self.predict_one(&sample));
        }

        Vector::from_vec(predictions)
    }

    fn predict_one(&self, x: &[f32]) -> f32 {
        let tree = self.tree.as_ref().expect("Model not fitted");

        let mut node = tree;
        loop {
            match node {
                RegressionTreeNode::Leaf(leaf) => return leaf.value,
                RegressionTreeNode::Node(internal) => {
                    if x[internal.feature_idx] <= internal.threshold {
                        node = &internal.left;
                    } else {
                        node = &internal.right;
                    }
                }
            }
        }
    }

    /// Computes the R² score on test data.
    #[must_use]
    pub fn score(&self, x: &Matrix<f32>, y: &Vector<f32>) -> f32 {
        let predictions = self.predict(x);
        crate::metrics::r_squared(&predictions, y)
    }
}

fn leaf(y: &Vector<f32>, indices: &[usize]) -> RegressionTreeNode {
    let sum: f32 = indices.iter().map(|&i| y[i]).sum();
    RegressionTreeNode::Leaf(RegressionLeaf {
        value: sum / indices.len() as f32,
        n_samples: indices.len(),
    })
}

/// Best split of one feature by weighted SSE, via sorted prefix sums.
///
/// Returns (threshold, sse) or None when no valid split respects
/// `min_samples_leaf`.
fn best_split_for_feature(
    x: &Matrix<f32>,
    y: &Vector<f32>,
    indices: &[usize],
    feature: usize,
    min_samples_leaf: usize,
) -> Option<(f32, f32)> {
    let n = indices.len();
    if n < 2 || n < min_samples_leaf * 2 {
        return None;
    }

    let mut order: Vec<usize> = indices.to_vec();
    order.sort_by(|&a, &b| {
        x.get(a, feature)
            .partial_cmp(&x.get(b, feature))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Prefix sums of y and y² in feature order
    let mut prefix_sum = vec![0.0f64; n + 1];
    let mut prefix_sq = vec![0.0f64; n + 1];
    for (pos, &i) in order.iter().enumerate() {
        let v = f64::from(y[i]);
        prefix_sum[pos + 1] = prefix_sum[pos] + v;
        prefix_sq[pos + 1] = prefix_sq[pos] + v * v;
    }

    let total_sum = prefix_sum[n];
    let total_sq = prefix_sq[n];

    let mut best: Option<(f32, f32)> = None;
    for split in min_samples_leaf..=(n - min_samples_leaf) {
        if split == 0 || split == n {
            continue;
        }
        let left_val = x.get(order[split - 1], feature);
        let right_val = x.get(order[split], feature);
        if (right_val - left_val).abs() < 1e-12 {
            continue; // identical values cannot separate
        }

        let ls = prefix_sum[split];
        let lq = prefix_sq[split];
        let rs = total_sum - ls;
        let rq = total_sq - lq;
        let nl = split as f64;
        let nr = (n - split) as f64;

        let sse = (lq - ls * ls / nl) + (rq - rs * rs / nr);
        let threshold = (left_val + right_val) / 2.0;

        if best.map_or(true, |(_, b)| (sse as f32) < b) {
            best = Some((threshold, sse as f32));
        }
    }
    best
}

#[allow(clippy::too_many_arguments)]
fn build_regression_tree(
    x: &Matrix<f32>,
    y: &Vector<f32>,
    indices: &[usize],
    depth: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
) -> RegressionTreeNode {
    let n = indices.len();

    if n < min_samples_split {
        return leaf(y, indices);
    }
    if let Some(max_d) = max_depth {
        if depth >= max_d {
            return leaf(y, indices);
        }
    }

    // Pure node: all targets equal
    let first = y[indices[0]];
    if indices.iter().all(|&i| (y[i] - first).abs() < 1e-12) {
        return leaf(y, indices);
    }

    let n_features = x.n_cols();
    let mut best: Option<(usize, f32, f32)> = None;
    for feature in 0..n_features {
        if let Some((threshold, sse)) =
            best_split_for_feature(x, y, indices, feature, min_samples_leaf)
        {
            if best.map_or(true, |(_, _, b)| sse < b) {
                best = Some((feature, threshold, sse));
            }
        }
    }

    let Some((feature_idx, threshold, _)) = best else {
        return leaf(y, indices);
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x.get(i, feature_idx) <= threshold);

    if left_idx.is_empty() || right_idx.is_empty() {
        return leaf(y, indices);
    }

    let left = build_regression_tree(
        x,
        y,
        &left_idx,
        depth + 1,
        max_depth,
        min_samples_split,
        min_samples_leaf,
    );
    let right = build_regression_tree(
        x,
        y,
        &right_idx,
        depth + 1,
        max_depth,
        min_samples_split,
        min_samples_leaf,
    );

    RegressionTreeNode::Node(RegressionNode {
        feature_idx,
        threshold,
        left: Box::new(left),
        right: Box::new(right),
    })
}
