//! KNN-based imputation

use crate::error::{PhishnetError, Result};
use crate::imputation::{Imputer, WeightScheme};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Fills missing entries with the mean of the nearest training rows that have
/// the feature present.
///
/// Distances use the NaN-aware Euclidean form
/// `sqrt(n_features / n_present * sum((a - b)^2))` over coordinates present in
/// both rows. Rows sharing no present coordinate are never neighbours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNImputer {
    /// Number of neighbors
    n_neighbors: usize,
    /// Weights for averaging
    weights: WeightScheme,
    /// Value marking a missing entry; NaN is always treated as missing too
    missing_value: f64,
    /// Training rows used as donors
    fit_data: Option<Array2<f64>>,
    /// Per-feature training means for rows without donors
    feature_means: Option<Array1<f64>>,
}

impl KNNImputer {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            weights: WeightScheme::Uniform,
            missing_value: f64::NAN,
            fit_data: None,
            feature_means: None,
        }
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_missing_value(mut self, value: f64) -> Self {
        self.missing_value = value;
        self
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn weights(&self) -> WeightScheme {
        self.weights
    }

    pub fn is_fitted(&self) -> bool {
        self.fit_data.is_some()
    }

    pub fn n_features(&self) -> Option<usize> {
        self.fit_data.as_ref().map(|d| d.ncols())
    }

    /// Training means used as the no-donor fallback
    pub fn feature_means(&self) -> Option<&Array1<f64>> {
        self.feature_means.as_ref()
    }

    fn is_missing(&self, v: f64) -> bool {
        v.is_nan() || (!self.missing_value.is_nan() && v == self.missing_value)
    }

    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> Option<f64> {
        let mut present = 0usize;
        let mut accum = 0.0f64;
        for (&ai, &bi) in a.iter().zip(b.iter()) {
            if self.is_missing(ai) || self.is_missing(bi) {
                continue;
            }
            present += 1;
            let d = ai - bi;
            accum += d * d;
        }
        if present == 0 {
            return None;
        }
        Some((a.len() as f64 / present as f64 * accum).sqrt())
    }

    fn impute_row(&self, row: ArrayView1<f64>, data: &Array2<f64>, means: &Array1<f64>) -> Vec<f64> {
        let mut out: Vec<f64> = row.to_vec();
        let missing: Vec<usize> = (0..row.len()).filter(|&j| self.is_missing(row[j])).collect();
        if missing.is_empty() {
            return out;
        }

        let distances: Vec<Option<f64>> = data
            .axis_iter(Axis(0))
            .map(|donor| self.distance(row, donor))
            .collect();

        for &feature in &missing {
            let mut donors: Vec<(f64, f64)> = distances
                .iter()
                .enumerate()
                .filter_map(|(i, d)| {
                    let value = data[[i, feature]];
                    match d {
                        Some(dist) if !self.is_missing(value) => Some((*dist, value)),
                        _ => None,
                    }
                })
                .collect();

            if donors.is_empty() {
                out[feature] = means[feature];
                continue;
            }

            donors.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            donors.truncate(self.n_neighbors);
            out[feature] = self.weighted_mean(&donors);
        }

        out
    }

    fn weighted_mean(&self, donors: &[(f64, f64)]) -> f64 {
        match self.weights {
            WeightScheme::Uniform => {
                donors.iter().map(|(_, v)| v).sum::<f64>() / donors.len() as f64
            }
            WeightScheme::Distance => {
                // Exact matches take all the weight.
                let exact: Vec<f64> = donors
                    .iter()
                    .filter(|(d, _)| *d == 0.0)
                    .map(|(_, v)| *v)
                    .collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }
                let (weighted, total) = donors.iter().fold((0.0, 0.0), |(ws, wt), (d, v)| {
                    let w = 1.0 / d;
                    (ws + w * v, wt + w)
                });
                weighted / total
            }
        }
    }
}

impl Default for KNNImputer {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Imputer for KNNImputer {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(PhishnetError::EmptyDataset(
                "cannot fit imputer on zero rows".to_string(),
            ));
        }

        let means: Array1<f64> = x
            .axis_iter(Axis(1))
            .map(|col| {
                let present: Vec<f64> = col.iter().copied().filter(|&v| !self.is_missing(v)).collect();
                if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                }
            })
            .collect();

        self.fit_data = Some(x.clone());
        self.feature_means = Some(means);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (data, means) = match (&self.fit_data, &self.feature_means) {
            (Some(d), Some(m)) => (d, m),
            _ => return Err(PhishnetError::ModelNotFitted),
        };

        if x.ncols() != data.ncols() {
            return Err(PhishnetError::ShapeError {
                expected: format!("{} features", data.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.impute_row(x.row(i), data, means))
            .collect();

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), x.ncols()), flat)?)
    }
}
