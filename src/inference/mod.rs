//! URL classification at serve time
//!
//! A URL is turned into the fixed-order feature vector by a
//! [`FeatureExtractor`], then labelled by the loaded [`PhishingModel`].

mod features;
mod model;

pub use features::{FeatureExtractor, LexicalExtractor, FEATURE_NAMES};
pub use model::{PhishingModel, MODEL_FILE, PREPROCESSOR_FILE};

use crate::error::{PhishnetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Category reported for a predicted label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Safe,
    Phishing,
}

impl Verdict {
    pub fn from_label(label: u8) -> Self {
        if label == 0 {
            Verdict::Safe
        } else {
            Verdict::Phishing
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Safe => "safe",
            Verdict::Phishing => "phishing",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub url: String,
    pub label: u8,
    pub category: Verdict,
}

/// Extractor and predictor bundle, shared across requests
#[derive(Clone)]
pub struct UrlClassifier {
    model: Arc<PhishingModel>,
    extractor: Arc<dyn FeatureExtractor>,
}

impl fmt::Debug for UrlClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlClassifier")
            .field("family", &self.model.family())
            .field("features", &self.model.feature_names().len())
            .finish()
    }
}

impl UrlClassifier {
    /// Fails if the extractor's output does not line up with the model's features
    pub fn new(model: Arc<PhishingModel>, extractor: Arc<dyn FeatureExtractor>) -> Result<Self> {
        let expected = model.feature_names();
        let produced = extractor.feature_names();
        if expected.len() != produced.len() || expected.iter().zip(produced).any(|(a, b)| a != b) {
            return Err(PhishnetError::ShapeError {
                expected: format!("{} model features {:?}", expected.len(), expected),
                actual: format!("{} extracted features {:?}", produced.len(), produced),
            });
        }
        Ok(Self { model, extractor })
    }

    /// Classifier over the lexical extractor
    pub fn lexical(model: Arc<PhishingModel>) -> Result<Self> {
        Self::new(model, Arc::new(LexicalExtractor::new()?))
    }

    pub fn model(&self) -> &PhishingModel {
        &self.model
    }

    pub fn classify(&self, url: &str) -> Result<Prediction> {
        let features = self.extractor.extract(url)?;
        let label = self.model.predict_features(&features)?;
        let category = Verdict::from_label(label);
        debug!(url, label, category = %category, "Classified URL");
        Ok(Prediction {
            url: url.to_string(),
            label,
            category,
        })
    }
}
