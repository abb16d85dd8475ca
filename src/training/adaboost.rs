//! AdaBoost (Adaptive Boosting) implementation
//!
//! Binary SAMME over decision stumps. Misclassified rows gain weight in each
//! round, and each stump votes with `learning_rate * ln((1 - e) / e)`.

use crate::error::{PhishnetError, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single decision stump: splits on one feature at one threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stump {
    feature_index: usize,
    threshold: f64,
    /// Vote when feature <= threshold, +1 or -1
    left_sign: f64,
}

impl Stump {
    fn vote(&self, value: f64) -> f64 {
        if value <= self.threshold {
            self.left_sign
        } else {
            -self.left_sign
        }
    }
}

/// AdaBoost Classifier for labels in {0, 1}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    pub n_estimators: usize,
    pub learning_rate: f64,
    stumps: Vec<Stump>,
    alphas: Vec<f64>,
    pub is_fitted: bool,
}

impl Default for AdaBoostClassifier {
    fn default() -> Self {
        Self::new(50, 1.0)
    }
}

impl AdaBoostClassifier {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            stumps: Vec::new(),
            alphas: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Lowest weighted-error stump for one feature, as (error, stump)
    fn best_stump_for_feature(
        x: &Array2<f64>,
        signs: &[f64],
        weights: &Array1<f64>,
        feature: usize,
    ) -> Option<(f64, Stump)> {
        let col = x.column(feature);
        let mut order: Vec<usize> = (0..col.len()).collect();
        order.sort_by(|&a, &b| col[a].partial_cmp(&col[b]).unwrap_or(Ordering::Equal));

        // Weight of positive and negative rows to the left of the cut
        let total_pos: f64 = (0..signs.len()).filter(|&i| signs[i] > 0.0).map(|i| weights[i]).sum();
        let total_neg: f64 = weights.sum() - total_pos;
        let (mut left_pos, mut left_neg) = (0.0, 0.0);
        let mut best: Option<(f64, Stump)> = None;

        for k in 0..order.len().saturating_sub(1) {
            let i = order[k];
            if signs[i] > 0.0 {
                left_pos += weights[i];
            } else {
                left_neg += weights[i];
            }
            let (a, b) = (col[i], col[order[k + 1]]);
            if a == b {
                continue;
            }
            // Left votes +1: errors are left negatives and right positives
            let err_plus = left_neg + (total_pos - left_pos);
            let err_minus = left_pos + (total_neg - left_neg);
            let (error, left_sign) = if err_plus <= err_minus {
                (err_plus, 1.0)
            } else {
                (err_minus, -1.0)
            };
            if best.as_ref().map_or(true, |(e, _)| error < *e) {
                best = Some((
                    error,
                    Stump {
                        feature_index: feature,
                        threshold: (a + b) / 2.0,
                        left_sign,
                    },
                ));
            }
        }
        best
    }

    fn fit_stump(x: &Array2<f64>, signs: &[f64], weights: &Array1<f64>) -> Option<(f64, Stump)> {
        let candidates: Vec<Option<(f64, Stump)>> = (0..x.ncols())
            .into_par_iter()
            .map(|f| Self::best_stump_for_feature(x, signs, weights, f))
            .collect();
        // Ties go to the lower feature index
        candidates.into_iter().flatten().fold(None, |best, cand| match best {
            Some((e, s)) if e <= cand.0 => Some((e, s)),
            _ => Some(cand),
        })
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(PhishnetError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(PhishnetError::EmptyDataset("cannot boost on zero rows".to_string()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(PhishnetError::InvalidParameter {
                name: "learning_rate".to_string(),
                value: self.learning_rate.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let mut signs = Vec::with_capacity(n_samples);
        for &v in y.iter() {
            match v {
                v if v == 1.0 => signs.push(1.0),
                v if v == 0.0 => signs.push(-1.0),
                other => {
                    return Err(PhishnetError::InvalidLabel {
                        column: "target".to_string(),
                        value: other,
                    })
                }
            }
        }

        let mut weights = Array1::from_elem(n_samples, 1.0 / n_samples as f64);
        self.stumps.clear();
        self.alphas.clear();

        for _ in 0..self.n_estimators {
            let Some((error, stump)) = Self::fit_stump(x, &signs, &weights) else {
                break;
            };

            let error = error / weights.sum();
            if error >= 0.5 {
                break;
            }
            let clipped = error.max(1e-10);
            let alpha = self.learning_rate * ((1.0 - clipped) / clipped).ln();

            for i in 0..n_samples {
                if stump.vote(x[[i, stump.feature_index]]) != signs[i] {
                    weights[i] *= alpha.exp();
                }
            }
            let total = weights.sum();
            weights.mapv_inplace(|w| w / total);

            self.stumps.push(stump);
            self.alphas.push(alpha);

            if error == 0.0 {
                break;
            }
        }

        self.is_fitted = true;
        Ok(self)
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(PhishnetError::ModelNotFitted);
        }
        let scores: Vec<f64> = x
            .outer_iter()
            .map(|row| {
                self.stumps
                    .iter()
                    .zip(self.alphas.iter())
                    .map(|(s, &a)| a * s.vote(row[s.feature_index]))
                    .sum()
            })
            .collect();
        Ok(Array1::from_vec(scores))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(|s| if s > 0.0 { 1.0 } else { 0.0 }))
    }

    /// Positive-class probability from the normalised vote margin
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let total: f64 = self.alphas.iter().sum();
        let scores = self.decision_function(x)?;
        if total <= 0.0 {
            return Ok(Array1::from_elem(x.nrows(), 0.5));
        }
        Ok(scores.mapv(|s| 1.0 / (1.0 + (-2.0 * s / total).exp())))
    }

    pub fn n_stumps(&self) -> usize {
        self.stumps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_single_stump_separates() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 1.0], [4.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = AdaBoostClassifier::new(10, 1.0);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        // Perfect stump ends boosting early
        assert_eq!(model.n_stumps(), 1);
    }

    #[test]
    fn test_boosting_combines_stumps() {
        // Positive only inside the band 2 < x0 < 5
        let x = Array2::from_shape_fn((8, 1), |(i, _)| i as f64);
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        let mut model = AdaBoostClassifier::new(20, 1.0);
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&x).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 7);
        assert!(model.n_stumps() > 1);
    }

    #[test]
    fn test_proba_bounds() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];
        let mut model = AdaBoostClassifier::new(5, 0.5);
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0, 2.0];
        let mut model = AdaBoostClassifier::default();
        assert!(matches!(model.fit(&x, &y), Err(PhishnetError::InvalidLabel { .. })));
    }

    #[test]
    fn test_unfitted() {
        let model = AdaBoostClassifier::default();
        assert!(model.predict(&array![[1.0]]).is_err());
    }
}
