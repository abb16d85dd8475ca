//! Model training module
//!
//! Native binary classifiers used as model-selection candidates:
//! - Decision trees and Random Forests
//! - Gradient boosting and AdaBoost
//! - Logistic regression
//! - K-Nearest Neighbors
//!
//! plus stratified cross-validation, grid search and classification metrics.

pub mod adaboost;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod knn;
pub mod linear_models;
pub mod metrics;
pub mod random_forest;
pub mod search;

pub use adaboost::AdaBoostClassifier;
pub use cross_validation::{CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig};
pub use linear_models::LogisticRegression;
pub use metrics::{ModelMetrics, ScoringMetric};
pub use random_forest::{MaxFeatures, RandomForest};
pub use search::{
    default_candidates, expand_grid, format_params, CandidateSpec, GridPointResult, GridSearch,
    HyperParams, ParamGrid, ParamValue, SearchResult,
};

use crate::error::{PhishnetError, Result};
use crate::imputation::WeightScheme;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Candidate model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    DecisionTree,
    RandomForest,
    GradientBoosting,
    LogisticRegression,
    #[serde(rename = "adaboost")]
    AdaBoost,
    Knn,
}

impl ModelFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::DecisionTree => "decision_tree",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::GradientBoosting => "gradient_boosting",
            ModelFamily::LogisticRegression => "logistic_regression",
            ModelFamily::AdaBoost => "adaboost",
            ModelFamily::Knn => "knn",
        }
    }

    /// Parameter names the family accepts in a grid
    pub fn parameters(self) -> &'static [&'static str] {
        match self {
            ModelFamily::DecisionTree => &["criterion", "max_depth", "min_samples_split", "min_samples_leaf"],
            ModelFamily::RandomForest => &["n_estimators", "criterion", "max_depth", "min_samples_leaf", "max_features"],
            ModelFamily::GradientBoosting => &[
                "n_estimators",
                "learning_rate",
                "subsample",
                "max_depth",
                "min_samples_leaf",
            ],
            ModelFamily::LogisticRegression => &["alpha", "learning_rate", "max_iter"],
            ModelFamily::AdaBoost => &["n_estimators", "learning_rate"],
            ModelFamily::Knn => &["n_neighbors", "weights", "metric"],
        }
    }

    /// Build an unfitted model for one grid point
    pub fn build(self, params: &HyperParams, random_state: u64) -> Result<TrainedModel> {
        let allowed = self.parameters();
        if let Some(name) = params.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(PhishnetError::InvalidParameter {
                name: name.clone(),
                value: params[name].to_string(),
                reason: format!("not a {} parameter", self),
            });
        }
        let p = Params(params);

        let model = match self {
            ModelFamily::DecisionTree => {
                let mut tree = DecisionTree::new_classifier()
                    .with_random_state(random_state)
                    .with_criterion(p.criterion()?.unwrap_or(Criterion::Gini));
                if let Some(d) = p.usize("max_depth")? {
                    tree = tree.with_max_depth(d);
                }
                if let Some(m) = p.usize("min_samples_split")? {
                    tree = tree.with_min_samples_split(m);
                }
                if let Some(m) = p.usize("min_samples_leaf")? {
                    tree = tree.with_min_samples_leaf(m);
                }
                TrainedModel::DecisionTree(tree)
            }
            ModelFamily::RandomForest => {
                let mut forest = RandomForest::new(p.usize("n_estimators")?.unwrap_or(100))
                    .with_random_state(random_state)
                    .with_criterion(p.criterion()?.unwrap_or(Criterion::Gini));
                if let Some(d) = p.usize("max_depth")? {
                    forest = forest.with_max_depth(d);
                }
                if let Some(m) = p.usize("min_samples_leaf")? {
                    forest = forest.with_min_samples_leaf(m);
                }
                if let Some(max_features) = p.max_features()? {
                    forest = forest.with_max_features(max_features);
                }
                TrainedModel::RandomForest(forest)
            }
            ModelFamily::GradientBoosting => {
                let defaults = GradientBoostingConfig::default();
                TrainedModel::GradientBoosting(GradientBoostingClassifier::new(GradientBoostingConfig {
                    n_estimators: p.usize("n_estimators")?.unwrap_or(defaults.n_estimators),
                    learning_rate: p.f64("learning_rate")?.unwrap_or(defaults.learning_rate),
                    subsample: p.f64("subsample")?.unwrap_or(defaults.subsample),
                    max_depth: p.usize("max_depth")?.unwrap_or(defaults.max_depth),
                    min_samples_leaf: p.usize("min_samples_leaf")?.unwrap_or(defaults.min_samples_leaf),
                    random_state: Some(random_state),
                }))
            }
            ModelFamily::LogisticRegression => {
                let mut model = LogisticRegression::new();
                if let Some(a) = p.f64("alpha")? {
                    model = model.with_alpha(a);
                }
                if let Some(lr) = p.f64("learning_rate")? {
                    model = model.with_learning_rate(lr);
                }
                if let Some(it) = p.usize("max_iter")? {
                    model = model.with_max_iter(it);
                }
                TrainedModel::LogisticRegression(model)
            }
            ModelFamily::AdaBoost => TrainedModel::AdaBoost(AdaBoostClassifier::new(
                p.usize("n_estimators")?.unwrap_or(50),
                p.f64("learning_rate")?.unwrap_or(1.0),
            )),
            ModelFamily::Knn => {
                let weights = match p.text("weights")? {
                    None | Some("uniform") => WeightScheme::Uniform,
                    Some("distance") => WeightScheme::Distance,
                    Some(other) => return Err(p.invalid("weights", other, "expected uniform or distance")),
                };
                let metric = match p.text("metric")? {
                    None | Some("euclidean") => DistanceMetric::Euclidean,
                    Some("manhattan") => DistanceMetric::Manhattan,
                    Some(other) => return Err(p.invalid("metric", other, "expected euclidean or manhattan")),
                };
                TrainedModel::Knn(KNNClassifier::new(KNNConfig {
                    n_neighbors: p.usize("n_neighbors")?.unwrap_or(5),
                    metric,
                    weights,
                }))
            }
        };
        Ok(model)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed lookups over a grid point
struct Params<'a>(&'a HyperParams);

impl Params<'_> {
    fn invalid(&self, name: &str, value: impl fmt::Display, reason: &str) -> PhishnetError {
        PhishnetError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn usize(&self, name: &str) -> Result<Option<usize>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(v) => match v.as_usize() {
                Some(n) => Ok(Some(n)),
                None => Err(self.invalid(name, v, "expected a non-negative integer")),
            },
        }
    }

    fn f64(&self, name: &str) -> Result<Option<f64>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(v) => match v.as_f64() {
                Some(x) => Ok(Some(x)),
                None => Err(self.invalid(name, v, "expected a number")),
            },
        }
    }

    fn text(&self, name: &str) -> Result<Option<&str>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(v) => match v.as_str() {
                Some(s) => Ok(Some(s)),
                None => Err(self.invalid(name, v, "expected a string")),
            },
        }
    }

    fn max_features(&self) -> Result<Option<MaxFeatures>> {
        let Some(value) = self.0.get("max_features") else {
            return Ok(None);
        };
        match (value.as_str(), value.as_f64()) {
            (Some("sqrt"), _) => Ok(Some(MaxFeatures::Sqrt)),
            (Some("log2"), _) => Ok(Some(MaxFeatures::Log2)),
            (Some("all"), _) => Ok(Some(MaxFeatures::All)),
            (None, Some(f)) if f > 0.0 && f <= 1.0 => Ok(Some(MaxFeatures::Fraction(f))),
            _ => Err(self.invalid("max_features", value, "expected sqrt, log2, all or a fraction in (0, 1]")),
        }
    }

    fn criterion(&self) -> Result<Option<Criterion>> {
        match self.text("criterion")? {
            None => Ok(None),
            Some(name) => {
                let c = Criterion::from_name(name)?;
                if !c.is_classification() {
                    return Err(self.invalid("criterion", name, "not a classification criterion"));
                }
                Ok(Some(c))
            }
        }
    }
}

/// A fitted (or ready to fit) binary classifier of any candidate family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoostingClassifier),
    LogisticRegression(LogisticRegression),
    AdaBoost(AdaBoostClassifier),
    Knn(KNNClassifier),
}

impl TrainedModel {
    pub fn family(&self) -> ModelFamily {
        match self {
            TrainedModel::DecisionTree(_) => ModelFamily::DecisionTree,
            TrainedModel::RandomForest(_) => ModelFamily::RandomForest,
            TrainedModel::GradientBoosting(_) => ModelFamily::GradientBoosting,
            TrainedModel::LogisticRegression(_) => ModelFamily::LogisticRegression,
            TrainedModel::AdaBoost(_) => ModelFamily::AdaBoost,
            TrainedModel::Knn(_) => ModelFamily::Knn,
        }
    }

    /// Fit on labels in {0, 1}
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            TrainedModel::DecisionTree(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::RandomForest(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::GradientBoosting(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::LogisticRegression(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::AdaBoost(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::Knn(m) => m.fit(x, y).map(|_| ()),
        }
    }

    /// Predicted labels, each 0.0 or 1.0
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            TrainedModel::DecisionTree(m) => m.predict(x),
            TrainedModel::RandomForest(m) => m.predict(x),
            TrainedModel::GradientBoosting(m) => m.predict(x),
            TrainedModel::LogisticRegression(m) => m.predict(x),
            TrainedModel::AdaBoost(m) => m.predict(x),
            TrainedModel::Knn(m) => m.predict(x),
        }
    }

    /// Positive-class probability
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            TrainedModel::DecisionTree(m) => m.predict_proba(x),
            TrainedModel::RandomForest(m) => m.predict_proba(x),
            TrainedModel::GradientBoosting(m) => m.predict_proba(x),
            TrainedModel::LogisticRegression(m) => m.predict_proba(x),
            TrainedModel::AdaBoost(m) => m.predict_proba(x),
            TrainedModel::Knn(m) => m.predict_proba(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_family_names_round_trip_through_serde() {
        for family in [
            ModelFamily::DecisionTree,
            ModelFamily::RandomForest,
            ModelFamily::GradientBoosting,
            ModelFamily::LogisticRegression,
            ModelFamily::AdaBoost,
            ModelFamily::Knn,
        ] {
            let json = serde_json::to_string(&family).unwrap();
            assert_eq!(json, format!("\"{}\"", family.as_str()));
        }
    }

    #[test]
    fn test_every_family_fits_and_predicts_binary() {
        let x = array![[0.0, 0.0], [0.2, 0.1], [0.1, 0.3], [3.0, 3.0], [3.2, 2.9], [2.8, 3.1]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        for candidate in default_candidates() {
            let point = expand_grid(&candidate.grid).unwrap().remove(0);
            let mut model = candidate.family.build(&point, 42).unwrap();
            model.fit(&x, &y).unwrap();
            let pred = model.predict(&x).unwrap();
            assert!(pred.iter().all(|&p| p == 0.0 || p == 1.0), "{}", candidate.family);
            assert_eq!(model.family(), candidate.family);
        }
    }

    #[test]
    fn test_build_rejects_wrong_types() {
        let mut params = HyperParams::new();
        params.insert("n_estimators".to_string(), ParamValue::Text("many".to_string()));
        assert!(ModelFamily::RandomForest.build(&params, 0).is_err());

        let mut params = HyperParams::new();
        params.insert("criterion".to_string(), ParamValue::Text("mse".to_string()));
        assert!(ModelFamily::DecisionTree.build(&params, 0).is_err());
    }

    #[test]
    fn test_forest_max_features_param() {
        let forest_with = |value: ParamValue| {
            let mut params = HyperParams::new();
            params.insert("max_features".to_string(), value);
            ModelFamily::RandomForest.build(&params, 0)
        };

        match forest_with(ParamValue::Text("log2".to_string())).unwrap() {
            TrainedModel::RandomForest(forest) => assert_eq!(forest.max_features, MaxFeatures::Log2),
            other => panic!("unexpected model {:?}", other.family()),
        }
        match forest_with(ParamValue::Float(0.5)).unwrap() {
            TrainedModel::RandomForest(forest) => assert_eq!(forest.max_features, MaxFeatures::Fraction(0.5)),
            other => panic!("unexpected model {:?}", other.family()),
        }
        assert!(forest_with(ParamValue::Float(1.5)).is_err());
        assert!(forest_with(ParamValue::Text("half".to_string())).is_err());
    }
}
