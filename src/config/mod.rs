//! Pipeline configuration
//!
//! One `PipelineConfig` carries every knob the stages read. The binary loads
//! it from TOML, applies environment overrides and hands it to the
//! orchestrator; stages never consult the environment themselves.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PhishnetError, Result};
use crate::imputation::WeightScheme;
use crate::schema::SchemaMode;
use crate::training::{default_candidates, CandidateSpec, ScoringMetric};

/// Environment variable overriding `store.uri`
pub const ENV_STORE_URI: &str = "PHISHNET_STORE_URI";
/// Environment variable overriding `pipeline.artifact_root`
pub const ENV_ARTIFACT_ROOT: &str = "PHISHNET_ARTIFACT_ROOT";
/// Environment variable overriding `pipeline.final_model_dir`
pub const ENV_FINAL_MODEL_DIR: &str = "PHISHNET_FINAL_MODEL_DIR";

/// Whether a drift failure stops the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftPolicy {
    /// Record drift in the report and keep training
    Advisory,
    /// Fail the run when any column drifts
    Blocking,
}

impl Default for DriftPolicy {
    fn default() -> Self {
        DriftPolicy::Advisory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub name: String,
    /// Parent of the timestamped run directories
    pub artifact_root: PathBuf,
    /// Well-known location of the latest preprocessor and model
    pub final_model_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "phishnet".to_string(),
            artifact_root: PathBuf::from("Artifacts"),
            final_model_dir: PathBuf::from("final_model"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `file://<dir>` or a bare directory path
    pub uri: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "file://data/store".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub database: String,
    pub collection: String,
    pub test_ratio: f64,
    pub random_state: u64,
    /// String value treated as missing in raw records
    pub missing_sentinel: String,
    pub feature_store_file: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            database: "netsec".to_string(),
            collection: "Network_Data".to_string(),
            test_ratio: 0.2,
            random_state: 42,
            missing_sentinel: "na".to_string(),
            feature_store_file: "phishing_data.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub schema_path: PathBuf,
    pub schema_mode: SchemaMode,
    /// KS p-value below which a column counts as drifted
    pub drift_threshold: f64,
    pub drift_policy: DriftPolicy,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema_path: PathBuf::from("data_schema/schema.yaml"),
            schema_mode: SchemaMode::Strict,
            drift_threshold: 0.05,
            drift_policy: DriftPolicy::Advisory,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationConfig {
    pub target_column: String,
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    /// Cell value treated as missing in addition to NaN
    pub missing_value: f64,
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            target_column: "Result".to_string(),
            n_neighbors: 3,
            weights: WeightScheme::Uniform,
            missing_value: f64::NAN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub cv_folds: usize,
    pub scoring: ScoringMetric,
    pub random_state: u64,
    pub candidates: Vec<CandidateSpec>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cv_folds: 3,
            scoring: ScoringMetric::Accuracy,
            random_state: 42,
            candidates: default_candidates(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("tracking"),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pipeline: RunConfig,
    pub store: StoreConfig,
    pub ingestion: IngestionConfig,
    pub validation: ValidationConfig,
    pub transformation: TransformationConfig,
    pub training: TrainingConfig,
    pub tracking: TrackingConfig,
}

impl PipelineConfig {
    /// Parse a TOML document; missing sections fall back to defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PhishnetError::ConfigError(format!("failed reading {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(ENV_STORE_URI) {
            self.store.uri = uri;
        }
        if let Some(root) = lookup(ENV_ARTIFACT_ROOT) {
            self.pipeline.artifact_root = PathBuf::from(root);
        }
        if let Some(dir) = lookup(ENV_FINAL_MODEL_DIR) {
            self.pipeline.final_model_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ratio = self.ingestion.test_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(invalid("ingestion.test_ratio", ratio, "must be in (0, 1)"));
        }
        let threshold = self.validation.drift_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(invalid("validation.drift_threshold", threshold, "must be in (0, 1)"));
        }
        if self.transformation.n_neighbors == 0 {
            return Err(invalid("transformation.n_neighbors", 0, "must be at least 1"));
        }
        if self.training.cv_folds < 2 {
            return Err(invalid("training.cv_folds", self.training.cv_folds, "must be at least 2"));
        }
        if self.transformation.target_column.is_empty() {
            return Err(PhishnetError::ConfigError(
                "transformation.target_column is empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: impl ToString, reason: &str) -> PhishnetError {
    PhishnetError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ModelFamily;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.ingestion.database, "netsec");
        assert_eq!(config.ingestion.collection, "Network_Data");
        assert_eq!(config.ingestion.test_ratio, 0.2);
        assert_eq!(config.ingestion.random_state, 42);
        assert_eq!(config.transformation.target_column, "Result");
        assert_eq!(config.transformation.n_neighbors, 3);
        assert!(config.transformation.missing_value.is_nan());
        assert_eq!(config.validation.drift_policy, DriftPolicy::Advisory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [ingestion]
            test_ratio = 0.25

            [validation]
            drift_policy = "blocking"

            [transformation]
            missing_value = -999.0
            "#,
        )
        .unwrap();

        assert_eq!(config.ingestion.test_ratio, 0.25);
        assert_eq!(config.transformation.missing_value, -999.0);
        assert_eq!(config.transformation.n_neighbors, 3);
        assert_eq!(config.ingestion.collection, "Network_Data");
        assert_eq!(config.validation.drift_policy, DriftPolicy::Blocking);
    }

    #[test]
    fn test_candidate_grid_from_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [[training.candidates]]
            family = "decision_tree"

            [training.candidates.grid]
            criterion = ["gini"]
            max_depth = [3, 5]
            "#,
        )
        .unwrap();

        assert_eq!(config.training.candidates.len(), 1);
        assert_eq!(config.training.candidates[0].family, ModelFamily::DecisionTree);
        assert_eq!(config.training.candidates[0].grid["max_depth"].len(), 2);
    }

    #[test]
    fn test_rejects_bad_ratio() {
        let result = PipelineConfig::from_toml_str("[ingestion]\ntest_ratio = 1.5\n");
        assert!(matches!(result, Err(PhishnetError::InvalidParameter { .. })));
    }

    #[test]
    fn test_overrides() {
        let mut config = PipelineConfig::default();
        config.apply_overrides(|key| match key {
            ENV_STORE_URI => Some("file:///srv/store".to_string()),
            _ => None,
        });
        assert_eq!(config.store.uri, "file:///srv/store");
        assert_eq!(config.pipeline.artifact_root, PathBuf::from("Artifacts"));
    }
}
