//! Decision tree implementation
//!
//! Classification trees expect labels in {0, 1}; regression trees (used as
//! boosting base learners) accept any target.

use crate::error::{PhishnetError, Result};
use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        /// Share of positive labels (classification) or the mean (regression)
        proba: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        gain: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    Mse,
}

impl Criterion {
    /// Parse a criterion name; `log_loss` is an alias of `entropy`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "gini" => Ok(Criterion::Gini),
            "entropy" | "log_loss" => Ok(Criterion::Entropy),
            "mse" | "squared_error" => Ok(Criterion::Mse),
            other => Err(PhishnetError::InvalidParameter {
                name: "criterion".to_string(),
                value: other.to_string(),
                reason: "expected gini, entropy, log_loss or squared_error".to_string(),
            }),
        }
    }

    pub fn is_classification(self) -> bool {
        !matches!(self, Criterion::Mse)
    }
}

/// Running label statistics of a node
#[derive(Debug, Clone, Copy, Default)]
struct NodeStats {
    count: usize,
    positives: usize,
    sum: f64,
    sq_sum: f64,
}

impl NodeStats {
    fn of(y: &Array1<f64>, indices: &[usize]) -> Self {
        let mut stats = Self::default();
        for &i in indices {
            stats.push(y[i]);
        }
        stats
    }

    fn push(&mut self, v: f64) {
        self.count += 1;
        if v >= 0.5 {
            self.positives += 1;
        }
        self.sum += v;
        self.sq_sum += v * v;
    }

    fn minus(&self, other: &NodeStats) -> NodeStats {
        NodeStats {
            count: self.count - other.count,
            positives: self.positives - other.positives,
            sum: self.sum - other.sum,
            sq_sum: self.sq_sum - other.sq_sum,
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => {
                let p = self.positives as f64 / n;
                2.0 * p * (1.0 - p)
            }
            Criterion::Entropy => {
                let p = self.positives as f64 / n;
                let term = |q: f64| if q > 0.0 { -q * q.ln() } else { 0.0 };
                term(p) + term(1.0 - p)
            }
            Criterion::Mse => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn per split; `None` uses all
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for feature sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::Mse,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PhishnetError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(PhishnetError::EmptyDataset("cannot fit a tree on zero rows".to_string()));
        }
        if self.criterion.is_classification() {
            if let Some(&bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
                return Err(PhishnetError::InvalidLabel {
                    column: "target".to_string(),
                    value: bad,
                });
            }
        }

        self.n_features = n_features;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut importances, &mut rng));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let stats = NodeStats::of(y, indices);
        let impurity = stats.impurity(self.criterion);

        let should_stop = indices.len() < self.min_samples_split
            || indices.len() < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;

        if should_stop {
            return self.leaf(&stats);
        }

        let features = self.candidate_features(rng);
        let Some((feature, threshold, gain)) = self.find_best_split(x, y, indices, &stats, &features)
        else {
            return self.leaf(&stats);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

        importances[feature] += indices.len() as f64 * gain;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: feature,
            threshold,
            left,
            right,
            n_samples: indices.len(),
            gain,
        }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut chosen = sample(rng, self.n_features, k).into_vec();
                chosen.sort_unstable();
                chosen
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Best (feature, threshold, gain) over the candidate features. Each
    /// feature is swept once in sorted order; ties keep the lower feature.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        parent: &NodeStats,
        features: &[usize],
    ) -> Option<(usize, f64, f64)> {
        let parent_impurity = parent.impurity(self.criterion);
        let n = indices.len() as f64;

        let per_feature: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&feature| {
                let mut order = indices.to_vec();
                order.sort_by(|&a, &b| {
                    x[[a, feature]]
                        .partial_cmp(&x[[b, feature]])
                        .unwrap_or(Ordering::Equal)
                });

                let mut left = NodeStats::default();
                let mut best: Option<(usize, f64, f64)> = None;

                for k in 0..order.len().saturating_sub(1) {
                    left.push(y[order[k]]);
                    let value = x[[order[k], feature]];
                    let next = x[[order[k + 1], feature]];
                    if value == next {
                        continue;
                    }
                    let n_left = k + 1;
                    let n_right = order.len() - n_left;
                    if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                        continue;
                    }

                    let right = parent.minus(&left);
                    let weighted = (n_left as f64 * left.impurity(self.criterion)
                        + n_right as f64 * right.impurity(self.criterion))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                        best = Some((feature, (value + next) / 2.0, gain));
                    }
                }
                best
            })
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(current) if current.2 >= cand.2 => Some(current),
                _ => Some(cand),
            })
    }

    fn leaf(&self, stats: &NodeStats) -> TreeNode {
        let n = stats.count.max(1) as f64;
        if self.criterion.is_classification() {
            let proba = stats.positives as f64 / n;
            // Ties go to the negative class.
            let value = if stats.positives * 2 > stats.count { 1.0 } else { 0.0 };
            TreeNode::Leaf {
                value,
                proba,
                n_samples: stats.count,
            }
        } else {
            let mean = stats.sum / n;
            TreeNode::Leaf {
                value: mean,
                proba: mean,
                n_samples: stats.count,
            }
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(PhishnetError::ModelNotFitted)?;
        self.check_width(x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| Self::find_leaf(root, row).0)
            .collect())
    }

    /// Positive-class probability (classification) or mean (regression)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(PhishnetError::ModelNotFitted)?;
        self.check_width(x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| Self::find_leaf(root, row).1)
            .collect())
    }

    fn find_leaf(node: &TreeNode, row: ndarray::ArrayView1<f64>) -> (f64, f64) {
        let mut current = node;
        loop {
            match current {
                TreeNode::Leaf { value, proba, .. } => return (*value, *proba),
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    current = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.n_features {
            return Err(PhishnetError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}
