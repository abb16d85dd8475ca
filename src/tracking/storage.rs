//! Local file system tracker

use super::{MetricsSink, RunRecord};
use crate::error::{PhishnetError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes `<base_dir>/<run_id>/metrics.json` plus the artifact blob
#[derive(Debug, Clone)]
pub struct LocalTracker {
    base_dir: PathBuf,
}

impl LocalTracker {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id == "." || run_id == ".." {
            return Err(PhishnetError::ConfigError(format!("invalid run id '{}'", run_id)));
        }
        Ok(self.base_dir.join(run_id))
    }

    /// Read back a logged run
    pub fn load_run(&self, run_id: &str) -> Result<RunRecord> {
        let path = self.run_dir(run_id)?.join("metrics.json");
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Run ids present on disk, sorted
    pub fn list_runs(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.path().join("metrics.json").is_file() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl MetricsSink for LocalTracker {
    fn log_run(
        &self,
        run_id: &str,
        metrics: &BTreeMap<String, f64>,
        artifact_name: &str,
        artifact_bytes: &[u8],
    ) -> Result<()> {
        if artifact_name.is_empty() || artifact_name.contains(['/', '\\']) {
            return Err(PhishnetError::ConfigError(format!(
                "invalid artifact name '{}'",
                artifact_name
            )));
        }
        let dir = self.run_dir(run_id)?;
        fs::create_dir_all(&dir)?;

        let record = RunRecord {
            run_id: run_id.to_string(),
            logged_at: chrono::Utc::now().to_rfc3339(),
            metrics: metrics.clone(),
            artifact: artifact_name.to_string(),
        };
        fs::write(dir.join("metrics.json"), serde_json::to_string_pretty(&record)?)?;
        fs::write(dir.join(artifact_name), artifact_bytes)?;

        debug!(run_id, dir = %dir.display(), "Logged run");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_and_load_run() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = LocalTracker::new(dir.path());
        let mut metrics = BTreeMap::new();
        metrics.insert("f1_score".to_string(), 0.9);

        tracker.log_run("run-train", &metrics, "model.bin", b"blob").unwrap();

        let record = tracker.load_run("run-train").unwrap();
        assert_eq!(record.metrics["f1_score"], 0.9);
        assert_eq!(record.artifact, "model.bin");
        assert_eq!(fs::read(dir.path().join("run-train").join("model.bin")).unwrap(), b"blob");
        assert_eq!(tracker.list_runs().unwrap(), vec!["run-train"]);
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = LocalTracker::new(dir.path());
        let metrics = BTreeMap::new();
        assert!(tracker.log_run("../escape", &metrics, "m.bin", b"").is_err());
        assert!(tracker.log_run("ok", &metrics, "a/b", b"").is_err());
    }
}
