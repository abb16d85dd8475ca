//! Model selection and training: grid search every candidate, keep the best
//! held-out score, bundle it with the fitted preprocessor.

use super::artifacts::{CandidateReport, ModelArtifact, RunLayout, TransformationArtifact};
use super::transformation::split_target;
use crate::config::TrainingConfig;
use crate::error::{PhishnetError, Result};
use crate::export::{load_object, to_bytes, ObjectKind};
use crate::inference::{PhishingModel, MODEL_FILE};
use crate::preprocessing::Preprocessor;
use crate::tracking::MetricsSink;
use crate::training::{format_params, GridSearch, ModelMetrics, SearchResult};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::fs;
use tracing::{debug, info, warn};

fn metrics_map(metrics: &ModelMetrics) -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("accuracy".to_string(), metrics.accuracy),
        ("f1_score".to_string(), metrics.f1_score),
        ("precision".to_string(), metrics.precision),
        ("recall".to_string(), metrics.recall),
    ])
}

fn require_both_classes(y: &Array1<f64>) -> Result<()> {
    let positives = y.iter().filter(|&&v| v == 1.0).count();
    if positives == 0 || positives == y.len() {
        return Err(PhishnetError::TrainingError(format!(
            "training labels hold a single class ({} of {} positive)",
            positives,
            y.len()
        )));
    }
    Ok(())
}

/// Replace `final_model/` with the preprocessor and model of this run.
///
/// Both files are staged next to their targets before either is renamed into
/// place, so a failed run leaves the previous pair untouched.
fn publish_final_model(layout: &RunLayout, preprocessor: &[u8], model: &[u8]) -> Result<()> {
    fs::create_dir_all(layout.final_model_dir())?;
    let files = [(layout.final_preprocessor(), preprocessor), (layout.final_model(), model)];

    let mut staged = Vec::with_capacity(files.len());
    for (target, bytes) in &files {
        let tmp = target.with_extension("bin.tmp");
        fs::write(&tmp, bytes)?;
        staged.push((tmp, target));
    }
    for (tmp, target) in staged {
        fs::rename(&tmp, target)?;
    }
    Ok(())
}

pub fn train(
    transformation: &TransformationArtifact,
    config: &TrainingConfig,
    layout: &RunLayout,
    sink: &dyn MetricsSink,
) -> Result<ModelArtifact> {
    if config.candidates.is_empty() {
        return Err(PhishnetError::TrainingError("no candidate models configured".to_string()));
    }

    let train_arr: Array2<f64> = load_object(&transformation.transformed_train_path, ObjectKind::Array)?;
    let test_arr: Array2<f64> = load_object(&transformation.transformed_test_path, ObjectKind::Array)?;
    let (x_train, y_train) = split_target(&train_arr)?;
    let (x_test, y_test) = split_target(&test_arr)?;
    require_both_classes(&y_train)?;

    let search = GridSearch::new(config.cv_folds, config.scoring).with_random_state(config.random_state);
    let mut candidates = Vec::with_capacity(config.candidates.len());
    let mut best: Option<(f64, SearchResult)> = None;

    for candidate in &config.candidates {
        let result = search.search(candidate, &x_train, &y_train)?;
        let test_score = config.scoring.score(&y_test, &result.model.predict(&x_test)?);
        info!(
            family = %result.family,
            params = %format_params(&result.best_params),
            cv_score = result.best_cv_score,
            test_score,
            "Candidate evaluated"
        );
        candidates.push(CandidateReport {
            family: result.family,
            best_params: result.best_params.clone(),
            cv_score: result.best_cv_score,
            test_score,
        });

        // Earlier candidates win ties
        let replace = best.as_ref().map_or(true, |(score, _)| test_score > *score);
        if replace {
            best = Some((test_score, result));
        }
    }

    let (best_score, winner) =
        best.ok_or_else(|| PhishnetError::TrainingError("no candidate produced a model".to_string()))?;

    let train_metrics = ModelMetrics::compute(&y_train, &winner.model.predict(&x_train)?);
    let test_metrics = ModelMetrics::compute(&y_test, &winner.model.predict(&x_test)?);
    info!(
        family = %winner.family,
        scoring = %config.scoring,
        score = best_score,
        train_f1 = train_metrics.f1_score,
        test_f1 = test_metrics.f1_score,
        "Selected model"
    );

    let preprocessor: Preprocessor = load_object(&transformation.preprocessor_path, ObjectKind::Preprocessor)?;
    let preprocessor_bytes = to_bytes(ObjectKind::Preprocessor, &preprocessor)?;
    let model_bytes = to_bytes(ObjectKind::Model, &winner.model)?;
    let bundle = PhishingModel::new(preprocessor, winner.model.clone())?;

    let model_path = layout.trained_model();
    bundle.save(&model_path)?;
    publish_final_model(layout, &preprocessor_bytes, &model_bytes)?;
    let final_model_path = layout.final_model();
    info!(path = %model_path.display(), final_path = %final_model_path.display(), "Saved model");

    let run_id = layout.run_id();
    let mut tracking_errors = Vec::new();
    for (suffix, metrics) in [("train", &train_metrics), ("test", &test_metrics)] {
        let sink_run = format!("{}-{}", run_id, suffix);
        match sink.log_run(&sink_run, &metrics_map(metrics), MODEL_FILE, &model_bytes) {
            Ok(()) => debug!(run = %sink_run, "Logged metrics"),
            Err(e) => {
                warn!(run = %sink_run, error = %e, "Metrics sink failed");
                tracking_errors.push(format!("{}: {}", sink_run, e));
            }
        }
    }

    Ok(ModelArtifact {
        model_path,
        final_model_path,
        family: winner.family,
        params: winner.best_params,
        train_metrics,
        test_metrics,
        candidates,
        tracking_errors,
    })
}
