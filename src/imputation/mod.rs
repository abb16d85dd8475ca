//! Missing value imputation

mod knn;

pub use knn::KNNImputer;

use crate::error::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// How neighbour values are averaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    /// Plain mean of the k neighbours
    Uniform,
    /// Inverse-distance weighted mean
    Distance,
}

impl Default for WeightScheme {
    fn default() -> Self {
        WeightScheme::Uniform
    }
}

/// Trait for imputers
pub trait Imputer: Send + Sync {
    /// Fit the imputer on data with missing values
    fn fit(&mut self, x: &Array2<f64>) -> Result<()>;

    /// Transform data by imputing missing values
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Fit and transform in one step
    fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}
