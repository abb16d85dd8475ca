//! Training pipeline
//!
//! Stages run strictly in order, each consuming the artifact of the one
//! before it:
//! - [`ingestion`]: document store to feature-store snapshot and train/test split
//! - [`validation`]: schema check and drift detection
//! - [`transformation`]: KNN imputation fitted on the training split
//! - [`trainer`]: grid search over candidate models and selection
//!
//! [`TrainingPipeline`] owns one run: it creates the run directory, threads the
//! artifacts and stops at the first unrecoverable failure.

pub mod artifacts;
pub mod ingestion;
pub mod trainer;
pub mod transformation;
pub mod validation;

pub use artifacts::{
    CandidateReport, IngestionArtifact, ModelArtifact, RunLayout, TransformationArtifact, ValidationArtifact,
    RUN_DIR_FORMAT,
};

use crate::config::{DriftPolicy, PipelineConfig};
use crate::error::{PhishnetError, Result, StageContext};
use crate::store::DocumentStore;
use crate::tracking::MetricsSink;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Validation,
    Transformation,
    Training,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ingestion => "ingestion",
            Stage::Validation => "validation",
            Stage::Transformation => "transformation",
            Stage::Training => "training",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Ingesting,
    Validating,
    Transforming,
    Training,
    Complete,
    Failed { stage: Stage },
}

impl PipelineState {
    fn running(stage: Stage) -> Self {
        match stage {
            Stage::Ingestion => PipelineState::Ingesting,
            Stage::Validation => PipelineState::Validating,
            Stage::Transformation => PipelineState::Transforming,
            Stage::Training => PipelineState::Training,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Failed { .. })
    }
}

/// Every artifact of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub layout: RunLayout,
    pub ingestion: IngestionArtifact,
    pub validation: ValidationArtifact,
    pub transformation: TransformationArtifact,
    pub model: ModelArtifact,
}

/// One end-to-end training run
pub struct TrainingPipeline {
    config: PipelineConfig,
    store: Arc<dyn DocumentStore>,
    sink: Arc<dyn MetricsSink>,
    started: Option<DateTime<Local>>,
    state: PipelineState,
}

impl fmt::Debug for TrainingPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingPipeline")
            .field("name", &self.config.pipeline.name)
            .field("state", &self.state)
            .finish()
    }
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn DocumentStore>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            store,
            sink,
            started: None,
            state: PipelineState::Idle,
        }
    }

    /// Fix the timestamp naming the run directory
    pub fn with_start_time(mut self, started: DateTime<Local>) -> Self {
        self.started = Some(started);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all stages once. A second call fails without touching the disk.
    pub fn run(&mut self) -> Result<PipelineOutcome> {
        if self.state != PipelineState::Idle {
            return Err(PhishnetError::PipelineError(format!(
                "pipeline already ran (state {:?})",
                self.state
            )));
        }

        let start = Instant::now();
        let started = self.started.unwrap_or_else(Local::now);
        self.state = PipelineState::Ingesting;
        let layout = RunLayout::create(
            &self.config.pipeline.artifact_root,
            &self.config.pipeline.final_model_dir,
            started,
        )
        .in_stage(Stage::Ingestion);
        let layout = self.settle(Stage::Ingestion, layout)?;
        info!(run = %layout.run_id(), dir = %layout.run_dir().display(), "Starting training pipeline");

        let ingestion = self.stage(Stage::Ingestion, |p| {
            ingestion::ingest(&p.config.ingestion, &layout, p.store.as_ref())
        })?;

        let validation = self.stage(Stage::Validation, |p| {
            let artifact = validation::validate(&ingestion, &p.config.validation, &layout)?;
            p.check_validation(&artifact)?;
            Ok(artifact)
        })?;

        let transformation = self.stage(Stage::Transformation, |p| {
            transformation::transform(&validation, &p.config.transformation, &layout)
        })?;

        let model = self.stage(Stage::Training, |p| {
            trainer::train(&transformation, &p.config.training, &layout, p.sink.as_ref())
        })?;

        self.state = PipelineState::Complete;
        info!(
            run = %layout.run_id(),
            family = %model.family,
            test_accuracy = model.test_metrics.accuracy,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training pipeline complete"
        );

        Ok(PipelineOutcome {
            layout,
            ingestion,
            validation,
            transformation,
            model,
        })
    }

    /// Turn a negative validation outcome into a failure where the run must stop
    fn check_validation(&self, artifact: &ValidationArtifact) -> Result<()> {
        if !artifact.schema_valid {
            return Err(PhishnetError::SchemaError(format!(
                "schema validation failed: {}",
                artifact.schema_mismatches.join("; ")
            )));
        }
        if artifact.drift_status == Some(false) && self.config.validation.drift_policy == DriftPolicy::Blocking {
            return Err(PhishnetError::DataError(format!(
                "drift detected in columns {:?}",
                artifact.drifted_columns
            )));
        }
        Ok(())
    }

    fn stage<T, F>(&mut self, stage: Stage, f: F) -> Result<T>
    where
        T: fmt::Debug,
        F: FnOnce(&Self) -> Result<T>,
    {
        self.state = PipelineState::running(stage);
        info!(stage = %stage, "Stage started");
        let result = f(self).in_stage(stage);
        let artifact = self.settle(stage, result)?;
        info!(stage = %stage, artifact = ?artifact, "Stage finished");
        Ok(artifact)
    }

    fn settle<T>(&mut self, stage: Stage, result: Result<T>) -> Result<T> {
        result.map_err(|err| {
            self.state = PipelineState::Failed { stage };
            error!(stage = %stage, error = %err.chain(), "Stage failed");
            err
        })
    }
}
