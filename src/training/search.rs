//! Hyperparameter grids and cross-validated grid search

use super::cross_validation::{CVStrategy, CrossValidator};
use super::metrics::ScoringMetric;
use super::{ModelFamily, TrainedModel};
use crate::error::{PhishnetError, Result};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// A single hyperparameter value as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Some(*v as usize),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Parameter name to the values to try
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

/// One point of a grid
pub type HyperParams = BTreeMap<String, ParamValue>;

/// Render params as `a=1, b=gini`
pub fn format_params(params: &HyperParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A model family and the grid searched for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub family: ModelFamily,
    #[serde(default)]
    pub grid: ParamGrid,
}

impl CandidateSpec {
    pub fn new(family: ModelFamily) -> Self {
        Self {
            family,
            grid: ParamGrid::new(),
        }
    }

    pub fn with_param(mut self, name: &str, values: Vec<ParamValue>) -> Self {
        self.grid.insert(name.to_string(), values);
        self
    }
}

fn ints(values: &[i64]) -> Vec<ParamValue> {
    values.iter().map(|&v| ParamValue::Int(v)).collect()
}

fn floats(values: &[f64]) -> Vec<ParamValue> {
    values.iter().map(|&v| ParamValue::Float(v)).collect()
}

fn texts(values: &[&str]) -> Vec<ParamValue> {
    values.iter().map(|v| ParamValue::Text(v.to_string())).collect()
}

/// The default candidate list, in selection order
pub fn default_candidates() -> Vec<CandidateSpec> {
    vec![
        CandidateSpec::new(ModelFamily::RandomForest).with_param("n_estimators", ints(&[8, 16, 32, 128, 256])),
        CandidateSpec::new(ModelFamily::DecisionTree).with_param("criterion", texts(&["gini", "entropy"])),
        CandidateSpec::new(ModelFamily::GradientBoosting)
            .with_param("learning_rate", floats(&[0.1, 0.01, 0.05, 0.001]))
            .with_param("subsample", floats(&[0.6, 0.7, 0.75, 0.85, 0.9]))
            .with_param("n_estimators", ints(&[8, 16, 32, 64, 128, 256])),
        CandidateSpec::new(ModelFamily::LogisticRegression),
        CandidateSpec::new(ModelFamily::AdaBoost)
            .with_param("learning_rate", floats(&[0.1, 0.01, 0.001]))
            .with_param("n_estimators", ints(&[8, 16, 32, 64, 128, 256])),
        CandidateSpec::new(ModelFamily::Knn).with_param("n_neighbors", ints(&[3, 5, 7])),
    ]
}

/// Cartesian product of a grid in key order, the last key varying fastest.
/// An empty grid yields a single empty point.
pub fn expand_grid(grid: &ParamGrid) -> Result<Vec<HyperParams>> {
    let mut points = vec![HyperParams::new()];
    for (name, values) in grid {
        if values.is_empty() {
            return Err(PhishnetError::InvalidParameter {
                name: name.clone(),
                value: "[]".to_string(),
                reason: "grid parameter has no values".to_string(),
            });
        }
        points = points
            .into_iter()
            .flat_map(|point| {
                values.iter().map(move |v| {
                    let mut next = point.clone();
                    next.insert(name.clone(), v.clone());
                    next
                })
            })
            .collect();
    }
    Ok(points)
}

/// Cross-validated score of one grid point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridPointResult {
    pub params: HyperParams,
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
}

/// Outcome of searching one candidate
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub family: ModelFamily,
    pub best_params: HyperParams,
    pub best_cv_score: f64,
    pub points: Vec<GridPointResult>,
    /// Best point refitted on the whole training set
    pub model: TrainedModel,
}

/// Exhaustive grid search scored by stratified k-fold cross-validation
#[derive(Debug, Clone)]
pub struct GridSearch {
    cv_folds: usize,
    scoring: ScoringMetric,
    random_state: u64,
}

impl GridSearch {
    pub fn new(cv_folds: usize, scoring: ScoringMetric) -> Self {
        Self {
            cv_folds,
            scoring,
            random_state: 42,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn scoring(&self) -> ScoringMetric {
        self.scoring
    }

    pub fn search(&self, candidate: &CandidateSpec, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult> {
        let points = expand_grid(&candidate.grid)?;
        // Validate every point up front so a typo fails before any fitting
        for params in &points {
            candidate.family.build(params, self.random_state)?;
        }

        let splits = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: self.cv_folds,
            shuffle: false,
        })
        .split(x.nrows(), Some(y))?;

        let results: Vec<GridPointResult> = points
            .into_par_iter()
            .map(|params| {
                let fold_scores = splits
                    .iter()
                    .map(|split| {
                        let x_train = x.select(Axis(0), &split.train_indices);
                        let y_train = y.select(Axis(0), &split.train_indices);
                        let x_val = x.select(Axis(0), &split.test_indices);
                        let y_val = y.select(Axis(0), &split.test_indices);

                        let mut model = candidate.family.build(&params, self.random_state)?;
                        model.fit(&x_train, &y_train)?;
                        Ok(self.scoring.score(&y_val, &model.predict(&x_val)?))
                    })
                    .collect::<Result<Vec<f64>>>()?;
                let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len().max(1) as f64;
                debug!(
                    family = %candidate.family,
                    params = %format_params(&params),
                    score = mean_score,
                    "Evaluated grid point"
                );
                Ok(GridPointResult {
                    params,
                    mean_score,
                    fold_scores,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // First best point wins ties
        let best_idx = (1..results.len()).fold(0, |best, i| {
            if results[i].mean_score > results[best].mean_score {
                i
            } else {
                best
            }
        });
        let best = results
            .get(best_idx)
            .ok_or_else(|| PhishnetError::TrainingError("grid produced no points".to_string()))?;

        let best_params = best.params.clone();
        let best_cv_score = best.mean_score;

        let mut model = candidate.family.build(&best_params, self.random_state)?;
        model.fit(x, y)?;

        Ok(SearchResult {
            family: candidate.family,
            best_params,
            best_cv_score,
            points: results,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_grid_order() {
        let mut grid = ParamGrid::new();
        grid.insert("a".to_string(), ints(&[1, 2]));
        grid.insert("b".to_string(), texts(&["x", "y"]));

        let points = expand_grid(&grid).unwrap();
        let rendered: Vec<String> = points.iter().map(format_params).collect();
        assert_eq!(rendered, vec!["a=1, b=x", "a=1, b=y", "a=2, b=x", "a=2, b=y"]);
    }

    #[test]
    fn test_empty_grid_is_single_point() {
        let points = expand_grid(&ParamGrid::new()).unwrap();
        assert_eq!(points.len(), 1);
        assert!(points[0].is_empty());
    }

    #[test]
    fn test_empty_values_rejected() {
        let mut grid = ParamGrid::new();
        grid.insert("n_estimators".to_string(), Vec::new());
        assert!(matches!(expand_grid(&grid), Err(PhishnetError::InvalidParameter { .. })));
    }

    #[test]
    fn test_default_grid_sizes() {
        let sizes: Vec<usize> = default_candidates()
            .iter()
            .map(|c| expand_grid(&c.grid).unwrap().len())
            .collect();
        assert_eq!(sizes, vec![5, 2, 120, 1, 18, 3]);
    }

    #[test]
    fn test_param_value_parsing() {
        let v: Vec<ParamValue> = serde_json::from_str(r#"[3, 0.5, "gini"]"#).unwrap();
        assert_eq!(v[0], ParamValue::Int(3));
        assert_eq!(v[1], ParamValue::Float(0.5));
        assert_eq!(v[2].as_str(), Some("gini"));
        assert_eq!(v[0].as_f64(), Some(3.0));
    }

    #[test]
    fn test_search_prefers_better_point() {
        // Class flips every 4 rows, so wide neighbourhoods blur the blocks
        let n = 48;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(n, |i| ((i / 4) % 2) as f64);

        let candidate = CandidateSpec::new(ModelFamily::Knn).with_param("n_neighbors", ints(&[1, 15]));
        let result = GridSearch::new(3, ScoringMetric::Accuracy).search(&candidate, &x, &y).unwrap();

        assert_eq!(result.points.len(), 2);
        assert_eq!(result.best_params["n_neighbors"], ParamValue::Int(1));
        assert!(result.points[0].mean_score > result.points[1].mean_score);
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let x = Array2::zeros((6, 1));
        let y = Array1::from_vec(vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        let candidate = CandidateSpec::new(ModelFamily::DecisionTree).with_param("depth", ints(&[2]));
        let err = GridSearch::new(3, ScoringMetric::Accuracy).search(&candidate, &x, &y).unwrap_err();
        assert!(matches!(err, PhishnetError::InvalidParameter { .. }));
    }
}
