//! phishnet - Phishing URL classifier
//!
//! This crate provides a staged training pipeline and a prediction service:
//! - Ingestion from a document store into a feature-store snapshot
//! - Schema validation and Kolmogorov-Smirnov drift detection
//! - KNN imputation fitted on the training split
//! - Grid-searched model selection over native classifiers
//! - URL feature extraction and a JSON prediction API
//!
//! # Modules
//!
//! ## Pipeline
//! - [`pipeline`] - Stage orchestration, run layout and artifacts
//! - [`config`] - Pipeline configuration
//!
//! ## Core ML Modules
//! - [`schema`] - Column schema checks
//! - [`drift`] - Data drift detection
//! - [`imputation`] - Missing value imputation
//! - [`preprocessing`] - Fitted preprocessing pipeline
//! - [`training`] - Classifiers, cross-validation and grid search
//! - [`inference`] - URL features and the predictor bundle
//!
//! ## Infrastructure
//! - [`store`] - Document store boundary
//! - [`tracking`] - Metrics sink
//! - [`export`] - Object serialization
//!
//! ## Services
//! - [`server`] - HTTP prediction API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Core ML modules
pub mod schema;
pub mod drift;
pub mod imputation;
pub mod preprocessing;
pub mod training;
pub mod inference;

// Pipeline
pub mod pipeline;

// Infrastructure
pub mod store;
pub mod tracking;
pub mod export;
pub mod utils;

// Services
pub mod server;
pub mod cli;

pub use error::{ErrorKind, PhishnetError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ErrorKind, PhishnetError, Result};

    pub use crate::config::{DriftPolicy, PipelineConfig};
    pub use crate::pipeline::{PipelineOutcome, PipelineState, RunLayout, Stage, TrainingPipeline};

    pub use crate::schema::{Schema, SchemaMode, SchemaValidator};
    pub use crate::drift::{DriftReport, TableDriftDetector};
    pub use crate::imputation::{KNNImputer, WeightScheme};
    pub use crate::preprocessing::Preprocessor;
    pub use crate::training::{CandidateSpec, GridSearch, ModelFamily, ModelMetrics, ScoringMetric, TrainedModel};
    pub use crate::inference::{FeatureExtractor, LexicalExtractor, PhishingModel, Prediction, UrlClassifier, Verdict};

    pub use crate::store::{DocumentStore, LocalDocumentStore};
    pub use crate::tracking::{LocalTracker, MetricsSink, NullSink};
}
