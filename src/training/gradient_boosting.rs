//! Gradient Boosting implementation
//!
//! Binary classifier boosting shallow regression trees on the gradient of
//! the log-loss. Scores live in log-odds space and go through the logistic
//! function at prediction time.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use crate::error::{PhishnetError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Subsample ratio for each tree
    pub subsample: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: Some(42),
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Gradient Boosting Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    initial_log_odds: f64,
    feature_importances: Vec<f64>,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_log_odds: 0.0,
            feature_importances: Vec::new(),
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    fn validate_config(&self) -> Result<()> {
        let c = &self.config;
        if !(c.learning_rate > 0.0) {
            return Err(PhishnetError::InvalidParameter {
                name: "learning_rate".to_string(),
                value: c.learning_rate.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !(c.subsample > 0.0 && c.subsample <= 1.0) {
            return Err(PhishnetError::InvalidParameter {
                name: "subsample".to_string(),
                value: c.subsample.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        Ok(())
    }

    /// Fit on labels in {0, 1}
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.validate_config()?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PhishnetError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(PhishnetError::EmptyDataset("cannot boost on zero rows".to_string()));
        }
        if let Some(&bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
            return Err(PhishnetError::InvalidLabel {
                column: "target".to_string(),
                value: bad,
            });
        }

        // Prior log-odds, clipped so a single-class target stays finite
        let pos_rate = (y.sum() / n_samples as f64).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (pos_rate / (1.0 - pos_rate)).ln();

        let mut scores = Array1::from_elem(n_samples, self.initial_log_odds);
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.trees.clear();
        self.feature_importances = vec![0.0; n_features];

        for _ in 0..self.config.n_estimators {
            let residuals: Array1<f64> = y
                .iter()
                .zip(scores.iter())
                .map(|(&yi, &si)| yi - sigmoid(si))
                .collect();

            let sample_indices = self.subsample_indices(n_samples, &mut rng);
            let x_sub = x.select(Axis(0), &sample_indices);
            let r_sub: Array1<f64> = sample_indices.iter().map(|&i| residuals[i]).collect();

            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf);
            tree.fit(&x_sub, &r_sub)?;

            // Every row moves, not only the ones the tree was fitted on
            let step = tree.predict(x)?;
            scores.scaled_add(self.config.learning_rate, &step);

            if let Some(imp) = tree.feature_importances() {
                for (acc, &v) in self.feature_importances.iter_mut().zip(imp.iter()) {
                    *acc += v;
                }
            }
            self.trees.push(tree);
        }

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= total;
            }
        }

        Ok(self)
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() && self.config.n_estimators > 0 {
            return Err(PhishnetError::ModelNotFitted);
        }
        let mut scores = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for tree in &self.trees {
            let step = tree.predict(x)?;
            scores.scaled_add(self.config.learning_rate, &step);
        }
        Ok(scores)
    }

    /// Positive-class probability
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .decision_function(x)?
            .mapv(|s| if s > 0.0 { 1.0 } else { 0.0 }))
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n).collect();
        }
        let sample_size = ((n as f64) * self.config.subsample).ceil().max(1.0) as usize;
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let n = 40;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = Array1::from_shape_fn(n, |i| if i >= 20 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn test_boosting_learns_threshold() {
        let (x, y) = step_data();
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 30,
            ..Default::default()
        });
        gb.fit(&x, &y).unwrap();

        let pred = gb.predict(&x).unwrap();
        assert_eq!(pred, y);
        assert_eq!(gb.n_trees(), 30);
    }

    #[test]
    fn test_subsampled_boosting_moves_all_rows() {
        let (x, y) = step_data();
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 60,
            subsample: 0.6,
            ..Default::default()
        });
        gb.fit(&x, &y).unwrap();

        let proba = gb.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.5);
        assert!(proba[39] > 0.5);
    }

    #[test]
    fn test_rejects_bad_labels() {
        let x = Array2::zeros((2, 1));
        let y = Array1::from_vec(vec![-1.0, 1.0]);
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig::default());
        assert!(matches!(gb.fit(&x, &y), Err(PhishnetError::InvalidLabel { .. })));
    }

    #[test]
    fn test_rejects_bad_subsample() {
        let (x, y) = step_data();
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig {
            subsample: 0.0,
            ..Default::default()
        });
        assert!(matches!(gb.fit(&x, &y), Err(PhishnetError::InvalidParameter { .. })));
    }
}
