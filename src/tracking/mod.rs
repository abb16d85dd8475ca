//! Metrics sink for training runs
//!
//! The trainer reports each metric snapshot as one run carrying the
//! serialized model as an artifact. Sink failures never fail training.

mod storage;

pub use storage::LocalTracker;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One metrics snapshot as stored by a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub logged_at: String,
    pub metrics: BTreeMap<String, f64>,
    pub artifact: String,
}

/// Destination for run metrics and artifacts
pub trait MetricsSink: Send + Sync {
    fn log_run(
        &self,
        run_id: &str,
        metrics: &BTreeMap<String, f64>,
        artifact_name: &str,
        artifact_bytes: &[u8],
    ) -> Result<()>;
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn log_run(&self, _: &str, _: &BTreeMap<String, f64>, _: &str, _: &[u8]) -> Result<()> {
        Ok(())
    }
}
