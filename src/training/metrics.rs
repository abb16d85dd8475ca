//! Binary classification metrics

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metrics for a set of binary predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

impl ModelMetrics {
    /// Compute metrics with class 1 as the positive class.
    ///
    /// Precision or recall with an empty denominator is 0.0, and so is F1
    /// when both are zero.
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let (tp, fp, tn, fn_) = Self::confusion_counts(y_true, y_pred);
        let total = (tp + fp + tn + fn_) as f64;

        let accuracy = if total > 0.0 { (tp + tn) as f64 / total } else { 0.0 };
        let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
        let recall = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy,
            precision,
            recall,
            f1_score,
        }
    }

    /// (tp, fp, tn, fn)
    pub fn confusion_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> (usize, usize, usize, usize) {
        let mut counts = (0, 0, 0, 0);
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t >= 0.5, p >= 0.5) {
                (true, true) => counts.0 += 1,
                (false, true) => counts.1 += 1,
                (false, false) => counts.2 += 1,
                (true, false) => counts.3 += 1,
            }
        }
        counts
    }

    pub fn get(&self, metric: ScoringMetric) -> f64 {
        match metric {
            ScoringMetric::Accuracy => self.accuracy,
            ScoringMetric::F1 => self.f1_score,
            ScoringMetric::Precision => self.precision,
            ScoringMetric::Recall => self.recall,
        }
    }
}

/// Primary metric used for grid search and model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMetric {
    Accuracy,
    F1,
    Precision,
    Recall,
}

impl Default for ScoringMetric {
    fn default() -> Self {
        ScoringMetric::Accuracy
    }
}

impl ScoringMetric {
    pub fn score(self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        ModelMetrics::compute(y_true, y_pred).get(self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoringMetric::Accuracy => "accuracy",
            ScoringMetric::F1 => "f1",
            ScoringMetric::Precision => "precision",
            ScoringMetric::Recall => "recall",
        }
    }
}

impl fmt::Display for ScoringMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
