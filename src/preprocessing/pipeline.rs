//! Fitted feature preprocessing pipeline

use crate::error::{PhishnetError, Result};
use crate::imputation::{Imputer, KNNImputer};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One transform in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PreprocessStep {
    Impute(KNNImputer),
}

impl PreprocessStep {
    fn name(&self) -> &'static str {
        match self {
            PreprocessStep::Impute(_) => "knn_imputer",
        }
    }

    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        match self {
            PreprocessStep::Impute(imputer) => imputer.fit(x),
        }
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            PreprocessStep::Impute(imputer) => imputer.transform(x),
        }
    }
}

/// Ordered steps applied to the feature matrix, bound to the feature names
/// seen at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    feature_names: Vec<String>,
    steps: Vec<PreprocessStep>,
    fitted: bool,
}

impl Preprocessor {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            steps: Vec::new(),
            fitted: false,
        }
    }

    /// Pipeline with a single KNN imputation step
    pub fn knn(feature_names: Vec<String>, imputer: KNNImputer) -> Self {
        Self::new(feature_names).with_step(PreprocessStep::Impute(imputer))
    }

    pub fn with_step(mut self, step: PreprocessStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn steps(&self) -> &[PreprocessStep] {
        &self.steps
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Fit each step on the output of the previous one
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        self.check_width(x)?;
        let mut current = x.clone();
        let last = self.steps.len().saturating_sub(1);
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.fit(&current)?;
            debug!(step = step.name(), rows = current.nrows(), "Fitted preprocessing step");
            if i < last {
                current = step.transform(&current)?;
            }
        }
        self.fitted = true;
        Ok(())
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(PhishnetError::ModelNotFitted);
        }
        self.check_width(x)?;
        let mut current = x.clone();
        for step in &self.steps {
            current = step.transform(&current)?;
        }
        Ok(current)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.feature_names.len() {
            return Err(PhishnetError::ShapeError {
                expected: format!("{} features", self.feature_names.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_knn_pipeline_imputes() {
        let train = array![[1.0, 2.0], [1.0, 4.0], [9.0, 100.0]];
        let mut pre = Preprocessor::knn(names(2), KNNImputer::new(2));
        pre.fit(&train).unwrap();

        let out = pre.transform(&array![[1.0, f64::NAN]]).unwrap();
        assert_eq!(out[[0, 1]], 3.0);
    }

    #[test]
    fn test_state_independent_of_later_data() {
        let train = array![[1.0, f64::NAN], [2.0, 3.0], [4.0, 5.0]];
        let test = array![[100.0, f64::NAN], [200.0, 300.0]];

        let mut alone = Preprocessor::knn(names(2), KNNImputer::new(3));
        alone.fit(&train).unwrap();

        let mut with_test = Preprocessor::knn(names(2), KNNImputer::new(3));
        with_test.fit(&train).unwrap();
        with_test.transform(&test).unwrap();

        let a = bincode::serialize(&alone).unwrap();
        let b = bincode::serialize(&with_test).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unfitted_and_width_checks() {
        let pre = Preprocessor::knn(names(2), KNNImputer::new(1));
        assert!(matches!(pre.transform(&array![[1.0, 2.0]]), Err(PhishnetError::ModelNotFitted)));

        let mut pre = Preprocessor::knn(names(2), KNNImputer::new(1));
        assert!(matches!(pre.fit(&array![[1.0]]), Err(PhishnetError::ShapeError { .. })));
    }
}
