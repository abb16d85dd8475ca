//! K-Nearest Neighbors classifier

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{PhishnetError, Result};
use crate::imputation::WeightScheme;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Euclidean
    }
}

impl DistanceMetric {
    fn distance(self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
        }
    }
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    /// Distance metric
    pub metric: DistanceMetric,
    /// Weighting scheme
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// K-Nearest Neighbors Classifier for labels in {0, 1}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: None,
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &KNNConfig {
        &self.config
    }

    /// Fit the classifier (stores training data)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(PhishnetError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(PhishnetError::EmptyDataset("cannot fit KNN on zero rows".to_string()));
        }
        if self.config.n_neighbors == 0 {
            return Err(PhishnetError::InvalidParameter {
                name: "n_neighbors".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(&bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
            return Err(PhishnetError::InvalidLabel {
                column: "target".to_string(),
                value: bad,
            });
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(self)
    }

    fn row_proba(&self, row: ArrayView1<f64>, x_train: &Array2<f64>, y_train: &Array1<f64>) -> f64 {
        let mut neighbours: Vec<(f64, usize)> = x_train
            .outer_iter()
            .enumerate()
            .map(|(i, train_row)| (self.config.metric.distance(row, train_row), i))
            .collect();
        // Stable sort keeps the earlier training row on equal distances
        neighbours.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        neighbours.truncate(self.config.n_neighbors);

        match self.config.weights {
            WeightScheme::Uniform => {
                neighbours.iter().map(|&(_, i)| y_train[i]).sum::<f64>() / neighbours.len() as f64
            }
            WeightScheme::Distance => {
                let exact: Vec<f64> = neighbours
                    .iter()
                    .filter(|(d, _)| *d == 0.0)
                    .map(|&(_, i)| y_train[i])
                    .collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }
                let (weighted, total) = neighbours.iter().fold((0.0, 0.0), |(ws, wt), &(d, i)| {
                    (ws + y_train[i] / d, wt + 1.0 / d)
                });
                weighted / total
            }
        }
    }

    /// Share of (weighted) neighbour votes for the positive class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(PhishnetError::ModelNotFitted),
        };
        if x.ncols() != x_train.ncols() {
            return Err(PhishnetError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let proba: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.row_proba(x.row(i), x_train, y_train))
            .collect();
        Ok(Array1::from_vec(proba))
    }

    /// Predict class labels (parallelized over test samples)
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_proba(x)?.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_majority_vote() {
        let x = array![[0.0], [0.1], [0.2], [5.0], [5.1], [5.2]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut knn = KNNClassifier::with_k(3);
        knn.fit(&x, &y).unwrap();

        let pred = knn.predict(&array![[0.05], [4.9]]).unwrap();
        assert_eq!(pred, array![0.0, 1.0]);
    }

    #[test]
    fn test_distance_weights() {
        let x = array![[0.0], [3.0], [4.0]];
        let y = array![1.0, 0.0, 0.0];
        let mut knn = KNNClassifier::new(KNNConfig {
            n_neighbors: 3,
            weights: WeightScheme::Distance,
            ..Default::default()
        });
        knn.fit(&x, &y).unwrap();

        // Uniform would say 1/3; the close positive dominates here
        let proba = knn.predict_proba(&array![[0.5]]).unwrap();
        assert!(proba[0] > 0.5);
    }

    #[test]
    fn test_manhattan_metric() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert_eq!(DistanceMetric::Manhattan.distance(a.view(), b.view()), 7.0);
        assert_eq!(DistanceMetric::Euclidean.distance(a.view(), b.view()), 5.0);
    }

    #[test]
    fn test_unfitted() {
        let knn = KNNClassifier::with_k(1);
        assert!(matches!(knn.predict(&array![[1.0]]), Err(PhishnetError::ModelNotFitted)));
    }
}
