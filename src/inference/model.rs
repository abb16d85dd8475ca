//! Fitted preprocessor and classifier, persisted and served together

use crate::error::{PhishnetError, Result};
use crate::export::{load_object, save_object, ObjectKind};
use crate::preprocessing::Preprocessor;
use crate::training::{ModelFamily, TrainedModel};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// File names inside the final model directory
pub const PREPROCESSOR_FILE: &str = "preprocessor.bin";
pub const MODEL_FILE: &str = "model.bin";

/// Predictor bundle: raw features go through the preprocessor, then the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhishingModel {
    preprocessor: Preprocessor,
    model: TrainedModel,
}

impl PhishingModel {
    pub fn new(preprocessor: Preprocessor, model: TrainedModel) -> Result<Self> {
        if !preprocessor.is_fitted() {
            return Err(PhishnetError::ModelNotFitted);
        }
        Ok(Self { preprocessor, model })
    }

    pub fn feature_names(&self) -> &[String] {
        self.preprocessor.feature_names()
    }

    pub fn family(&self) -> ModelFamily {
        self.model.family()
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Labels in {0, 1} for raw feature rows
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let transformed = self.preprocessor.transform(x)?;
        self.model.predict(&transformed)
    }

    /// Phishing probability for raw feature rows
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let transformed = self.preprocessor.transform(x)?;
        self.model.predict_proba(&transformed)
    }

    /// Label of a single feature vector
    pub fn predict_features(&self, features: &[f64]) -> Result<u8> {
        let row = Array2::from_shape_vec((1, features.len()), features.to_vec())?;
        let labels = self.predict(&row)?;
        match labels.first() {
            Some(&label) if label == 1.0 => Ok(1),
            Some(&label) if label == 0.0 => Ok(0),
            other => Err(PhishnetError::PredictionError(format!(
                "model produced {:?} for a single row",
                other
            ))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_object(path, ObjectKind::Bundle, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_object(path, ObjectKind::Bundle)
    }

    /// Assemble the bundle from the final model directory
    pub fn load_final(dir: &Path) -> Result<Self> {
        let preprocessor: Preprocessor = load_object(&dir.join(PREPROCESSOR_FILE), ObjectKind::Preprocessor)?;
        let model: TrainedModel = load_object(&dir.join(MODEL_FILE), ObjectKind::Model)?;
        let bundle = Self::new(preprocessor, model)?;
        info!(
            dir = %dir.display(),
            family = %bundle.family(),
            features = bundle.feature_names().len(),
            "Loaded final model"
        );
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imputation::KNNImputer;
    use crate::training::HyperParams;
    use ndarray::array;

    fn fitted_bundle() -> PhishingModel {
        let x = array![
            [1.0, -1.0],
            [1.0, -1.0],
            [1.0, f64::NAN],
            [-1.0, 1.0],
            [-1.0, 1.0],
            [-1.0, 1.0]
        ];
        let y = array![1.0, 1.0, 1.0, 0.0, 0.0, 0.0];

        let mut preprocessor = Preprocessor::knn(vec!["a".to_string(), "b".to_string()], KNNImputer::new(2));
        preprocessor.fit(&x).unwrap();
        let x_t = preprocessor.transform(&x).unwrap();

        let mut model = ModelFamily::DecisionTree.build(&HyperParams::new(), 42).unwrap();
        model.fit(&x_t, &y).unwrap();
        PhishingModel::new(preprocessor, model).unwrap()
    }

    #[test]
    fn test_rejects_unfitted_preprocessor() {
        let preprocessor = Preprocessor::knn(vec!["a".to_string()], KNNImputer::new(3));
        let model = ModelFamily::DecisionTree.build(&HyperParams::new(), 42).unwrap();
        assert!(matches!(
            PhishingModel::new(preprocessor, model),
            Err(PhishnetError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_predictions_use_preprocessor() {
        let bundle = fitted_bundle();
        assert_eq!(bundle.feature_names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(bundle.predict_features(&[1.0, f64::NAN]).unwrap(), 1);
        assert_eq!(bundle.predict_features(&[-1.0, 1.0]).unwrap(), 0);
        assert!(bundle.predict_features(&[1.0]).is_err());
    }

    #[test]
    fn test_bundle_persistence_keeps_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let bundle = fitted_bundle();
        bundle.save(&path).unwrap();

        let loaded = PhishingModel::load(&path).unwrap();
        let x = array![[1.0, -1.0], [-1.0, f64::NAN], [-1.0, 1.0]];
        assert_eq!(loaded.predict(&x).unwrap(), bundle.predict(&x).unwrap());
        assert_eq!(loaded.family(), ModelFamily::DecisionTree);
    }

    #[test]
    fn test_load_final_directory() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = fitted_bundle();
        save_object(&dir.path().join(PREPROCESSOR_FILE), ObjectKind::Preprocessor, bundle.preprocessor()).unwrap();
        save_object(&dir.path().join(MODEL_FILE), ObjectKind::Model, bundle.model()).unwrap();

        let loaded = PhishingModel::load_final(dir.path()).unwrap();
        assert_eq!(loaded.predict_features(&[1.0, -1.0]).unwrap(), 1);

        let missing = tempfile::tempdir().unwrap();
        assert!(matches!(
            PhishingModel::load_final(missing.path()),
            Err(PhishnetError::IoError(_))
        ));
    }
}
