//! Run directory layout and the artifacts each stage hands to the next

use crate::error::{PhishnetError, Result};
use crate::training::{HyperParams, ModelFamily, ModelMetrics};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

/// Timestamp format of run directory names
pub const RUN_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Paths of one run's outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLayout {
    run_dir: PathBuf,
    final_model_dir: PathBuf,
}

impl RunLayout {
    /// Create a fresh run directory under `artifact_root`, named after the
    /// timestamp, with a `-N` suffix when that name is taken.
    pub fn create(artifact_root: &Path, final_model_dir: &Path, started: DateTime<Local>) -> Result<Self> {
        fs::create_dir_all(artifact_root)?;
        let base = started.format(RUN_DIR_FORMAT).to_string();

        for attempt in 0..1000u32 {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };
            let candidate = artifact_root.join(&name);
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(Self::at(candidate, final_model_dir)),
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(PhishnetError::PipelineError(format!(
            "no free run directory for {} under {}",
            base,
            artifact_root.display()
        )))
    }

    /// Layout over an existing run directory
    pub fn at(run_dir: impl Into<PathBuf>, final_model_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            final_model_dir: final_model_dir.into(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory name, used as the run id for the metrics sink
    pub fn run_id(&self) -> String {
        self.run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string())
    }

    pub fn final_model_dir(&self) -> &Path {
        &self.final_model_dir
    }

    pub fn feature_store_file(&self, file_name: &str) -> PathBuf {
        self.run_dir.join("data_ingestion").join("feature_store").join(file_name)
    }

    pub fn ingested_train(&self) -> PathBuf {
        self.run_dir.join("data_ingestion").join("ingested").join("train.csv")
    }

    pub fn ingested_test(&self) -> PathBuf {
        self.run_dir.join("data_ingestion").join("ingested").join("test.csv")
    }

    pub fn valid_train(&self) -> PathBuf {
        self.run_dir.join("data_validation").join("validated").join("train.csv")
    }

    pub fn valid_test(&self) -> PathBuf {
        self.run_dir.join("data_validation").join("validated").join("test.csv")
    }

    pub fn invalid_train(&self) -> PathBuf {
        self.run_dir.join("data_validation").join("invalid").join("train.csv")
    }

    pub fn invalid_test(&self) -> PathBuf {
        self.run_dir.join("data_validation").join("invalid").join("test.csv")
    }

    pub fn drift_report(&self) -> PathBuf {
        self.run_dir.join("data_validation").join("drift_report").join("report.yaml")
    }

    pub fn transformed_train(&self) -> PathBuf {
        self.run_dir.join("data_transformation").join("transformed").join("train.bin")
    }

    pub fn transformed_test(&self) -> PathBuf {
        self.run_dir.join("data_transformation").join("transformed").join("test.bin")
    }

    pub fn preprocessor(&self) -> PathBuf {
        self.run_dir
            .join("data_transformation")
            .join("transformed_object")
            .join("preprocessor.bin")
    }

    pub fn trained_model(&self) -> PathBuf {
        self.run_dir.join("model_trainer").join("trained_model").join("model.bin")
    }

    pub fn final_preprocessor(&self) -> PathBuf {
        self.final_model_dir.join("preprocessor.bin")
    }

    pub fn final_model(&self) -> PathBuf {
        self.final_model_dir.join("model.bin")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionArtifact {
    pub feature_store_path: PathBuf,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub n_rows: usize,
    pub n_train: usize,
    pub n_test: usize,
}

/// Valid paths are set iff the schema check passed, invalid paths iff it
/// failed. The drift report exists only when drift detection ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationArtifact {
    pub validation_status: bool,
    pub schema_valid: bool,
    /// `Some(true)` when no column drifted
    pub drift_status: Option<bool>,
    pub valid_train_path: Option<PathBuf>,
    pub valid_test_path: Option<PathBuf>,
    pub invalid_train_path: Option<PathBuf>,
    pub invalid_test_path: Option<PathBuf>,
    pub drift_report_path: Option<PathBuf>,
    pub drifted_columns: Vec<String>,
    pub schema_mismatches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationArtifact {
    /// Features followed by the target as the last column
    pub transformed_train_path: PathBuf,
    pub transformed_test_path: PathBuf,
    pub preprocessor_path: PathBuf,
    pub feature_names: Vec<String>,
}

/// Selection outcome of one candidate family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub family: ModelFamily,
    pub best_params: HyperParams,
    pub cv_score: f64,
    pub test_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_path: PathBuf,
    pub final_model_path: PathBuf,
    pub family: ModelFamily,
    pub params: HyperParams,
    pub train_metrics: ModelMetrics,
    pub test_metrics: ModelMetrics,
    pub candidates: Vec<CandidateReport>,
    /// Metrics sink failures, logged but not fatal
    pub tracking_errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_dirs_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let ts = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();

        let first = RunLayout::create(dir.path(), Path::new("final_model"), ts).unwrap();
        let second = RunLayout::create(dir.path(), Path::new("final_model"), ts).unwrap();

        assert_eq!(first.run_id(), "2024-03-01_12-30-05");
        assert_eq!(second.run_id(), "2024-03-01_12-30-05-1");
        assert!(second.run_dir().is_dir());
    }

    #[test]
    fn test_layout_paths() {
        let layout = RunLayout::at("Artifacts/run", "final_model");
        assert_eq!(
            layout.ingested_train(),
            PathBuf::from("Artifacts/run/data_ingestion/ingested/train.csv")
        );
        assert_eq!(
            layout.drift_report(),
            PathBuf::from("Artifacts/run/data_validation/drift_report/report.yaml")
        );
        assert_eq!(layout.final_model(), PathBuf::from("final_model/model.bin"));
    }
}
