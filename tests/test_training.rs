//! Integration test: candidate families, grid search and model persistence

use phishnet::export::{from_bytes, to_bytes, ObjectKind};
use phishnet::training::{
    default_candidates, CVStrategy, CandidateSpec, CrossValidator, GridSearch, HyperParams, ModelFamily,
    ModelMetrics, ParamValue, ScoringMetric, TrainedModel,
};
use phishnet::utils::{column_to_array1, columns_to_array2};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Coded like the phishing dataset: `f1` decides the label, `f2` mostly
/// agrees, `f3` is noise.
fn coded_df() -> DataFrame {
    df!(
        "f1" => &[1i64, 1, 1, 1, 1, 1, 1, 1, 1, 1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
                  1, 1, 1, 1, 1, 1, -1, -1, -1, -1, -1, -1],
        "f2" => &[1i64, 1, 1, -1, 1, 1, 1, 1, -1, 1, -1, -1, 1, -1, -1, -1, -1, 1, -1, -1,
                  1, 1, 1, -1, 1, 1, -1, -1, -1, 1, -1, -1],
        "f3" => &[1i64, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1,
                  -1, -1, 1, 1, -1, 1, 1, -1, -1, 1, 1, -1],
        "target" => &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
                      0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
    )
    .unwrap()
}

fn arrays() -> (Array2<f64>, Array1<f64>) {
    let df = coded_df();
    let features = vec!["f1".to_string(), "f2".to_string(), "f3".to_string()];
    (
        columns_to_array2(&df, &features).unwrap(),
        column_to_array1(&df, "target").unwrap(),
    )
}

#[test]
fn test_every_family_learns_the_rule() {
    let (x, y) = arrays();
    let families = [
        ModelFamily::DecisionTree,
        ModelFamily::RandomForest,
        ModelFamily::GradientBoosting,
        ModelFamily::LogisticRegression,
        ModelFamily::AdaBoost,
        ModelFamily::Knn,
    ];

    for family in families {
        let mut model = family.build(&HyperParams::new(), 42).unwrap();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.family(), family);

        let predictions = model.predict(&x).unwrap();
        assert!(predictions.iter().all(|&p| p == 0.0 || p == 1.0));

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));

        let metrics = ModelMetrics::compute(&y, &predictions);
        assert!(metrics.accuracy >= 0.85, "{} accuracy {}", family, metrics.accuracy);
    }
}

#[test]
fn test_grid_search_over_forest_sizes() {
    let (x, y) = arrays();
    let candidate = CandidateSpec::new(ModelFamily::RandomForest)
        .with_param("n_estimators", vec![ParamValue::Int(4), ParamValue::Int(8)]);

    let result = GridSearch::new(3, ScoringMetric::F1)
        .with_random_state(7)
        .search(&candidate, &x, &y)
        .unwrap();

    assert_eq!(result.family, ModelFamily::RandomForest);
    assert_eq!(result.points.len(), 2);
    assert!(result.points.iter().all(|p| p.fold_scores.len() == 3));
    assert!(result.best_cv_score >= 0.8);
    assert!(result.points.iter().any(|p| p.params == result.best_params));
}

#[test]
fn test_stratified_folds_keep_class_balance() {
    let (_, y) = arrays();
    let splits = CrossValidator::new(CVStrategy::StratifiedKFold {
        n_splits: 4,
        shuffle: false,
    })
    .split(y.len(), Some(&y))
    .unwrap();

    assert_eq!(splits.len(), 4);
    for split in &splits {
        let positives = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
        assert_eq!(split.test_indices.len(), 8);
        assert_eq!(positives, 4);
    }
}

#[test]
fn test_trained_model_survives_serialization() {
    let (x, y) = arrays();
    let mut model = ModelFamily::GradientBoosting
        .build(&HyperParams::from([("n_estimators".to_string(), ParamValue::Int(16))]), 42)
        .unwrap();
    model.fit(&x, &y).unwrap();

    let bytes = to_bytes(ObjectKind::Model, &model).unwrap();
    let restored: TrainedModel = from_bytes(ObjectKind::Model, &bytes).unwrap();

    assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
    assert_eq!(restored.predict_proba(&x).unwrap(), model.predict_proba(&x).unwrap());
}

#[test]
fn test_default_candidates_are_buildable() {
    let candidates = default_candidates();
    let families: Vec<ModelFamily> = candidates.iter().map(|c| c.family).collect();
    assert_eq!(
        families,
        vec![
            ModelFamily::RandomForest,
            ModelFamily::DecisionTree,
            ModelFamily::GradientBoosting,
            ModelFamily::LogisticRegression,
            ModelFamily::AdaBoost,
            ModelFamily::Knn,
        ]
    );
    for candidate in &candidates {
        for values in candidate.grid.values() {
            let params = HyperParams::from([("unknown_param".to_string(), values[0].clone())]);
            // Only names each family knows are accepted
            assert!(candidate.family.build(&params, 42).is_err());
        }
        let first: HyperParams = candidate
            .grid
            .iter()
            .map(|(k, v)| (k.clone(), v[0].clone()))
            .collect();
        assert!(candidate.family.build(&first, 42).is_ok());
    }
}
