//! Drift detection module
//!
//! Compares the distribution of every column between a reference table and a
//! current table with a two-sample Kolmogorov-Smirnov test.

mod data_drift;

pub use data_drift::{KolmogorovSmirnovTest, KsOutcome, EXACT_LIMIT};

use crate::error::{PhishnetError, Result};
use crate::utils::{column_names, column_to_vec};
use ndarray::Array1;
use polars::prelude::DataFrame;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Drift detection result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftResult {
    /// Whether drift was detected
    pub drift_detected: bool,
    /// Test statistic
    pub statistic: f64,
    pub p_value: f64,
    /// Threshold used for detection
    pub threshold: f64,
    pub message: String,
}

impl DriftResult {
    /// Create a result indicating no drift
    pub fn no_drift(statistic: f64, p_value: f64, threshold: f64) -> Self {
        Self {
            drift_detected: false,
            statistic,
            p_value,
            threshold,
            message: "No drift detected".to_string(),
        }
    }

    /// Create a result indicating drift
    pub fn drift(statistic: f64, p_value: f64, threshold: f64, message: &str) -> Self {
        Self {
            drift_detected: true,
            statistic,
            p_value,
            threshold,
            message: message.to_string(),
        }
    }
}

/// Trait for drift detectors
pub trait DriftDetector: Send + Sync {
    /// Detect drift between reference and test data
    fn detect(&self, reference: &Array1<f64>, test: &Array1<f64>) -> Result<DriftResult>;

    /// Get the threshold used for detection
    fn threshold(&self) -> f64;
}

/// Per-column entry of a [`DriftReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub p_value: f64,
    /// `true` when the column drifted
    pub drift_status: bool,
}

/// Column name to drift outcome, persisted as YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriftReport {
    pub columns: BTreeMap<String, ColumnDrift>,
}

impl DriftReport {
    /// `true` iff no column drifted
    pub fn passed(&self) -> bool {
        self.columns.values().all(|c| !c.drift_status)
    }

    pub fn drifted_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, c)| c.drift_status)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Applies a column detector to every column of a reference table
pub struct TableDriftDetector<D: DriftDetector = KolmogorovSmirnovTest> {
    detector: D,
}

impl TableDriftDetector<KolmogorovSmirnovTest> {
    /// KS-based detector flagging columns with p-value below `threshold`
    pub fn ks(threshold: f64) -> Self {
        Self::new(KolmogorovSmirnovTest::new(threshold))
    }
}

impl<D: DriftDetector> TableDriftDetector<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    /// Returns the overall pass flag and the per-column report.
    ///
    /// Every reference column must exist in `current`. Nulls are excluded from
    /// both samples; a column with no values left is an error.
    pub fn detect(&self, reference: &DataFrame, current: &DataFrame) -> Result<(bool, DriftReport)> {
        let names = column_names(reference);
        for name in &names {
            if current.column(name).is_err() {
                return Err(PhishnetError::ColumnNotFound(format!(
                    "{} (absent from current table)",
                    name
                )));
            }
        }

        let entries: Vec<(String, ColumnDrift)> = names
            .par_iter()
            .map(|name| {
                let reference_values = non_null(column_to_vec(reference, name)?, name)?;
                let current_values = non_null(column_to_vec(current, name)?, name)?;
                let result = self.detector.detect(&reference_values, &current_values)?;
                debug!(
                    column = %name,
                    statistic = result.statistic,
                    p_value = result.p_value,
                    drift = result.drift_detected,
                    "Column drift test"
                );
                Ok((
                    name.clone(),
                    ColumnDrift {
                        p_value: result.p_value,
                        drift_status: result.drift_detected,
                    },
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let report = DriftReport {
            columns: entries.into_iter().collect(),
        };
        Ok((report.passed(), report))
    }
}

fn non_null(values: Vec<f64>, column: &str) -> Result<Array1<f64>> {
    let kept: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if kept.is_empty() {
        return Err(PhishnetError::EmptyDataset(format!(
            "column {} has no non-null values",
            column
        )));
    }
    Ok(Array1::from_vec(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_report_keys_match_reference_columns() {
        let reference = df!(
            "a" => &[1i64, 1, 1, 1, 1],
            "b" => &[1i64, 2, 3, 4, 5]
        )
        .unwrap();
        let current = df!(
            "a" => &[1i64, 1, 1, 1, 1],
            "b" => &[100i64, 200, 300, 400, 500],
            "extra" => &[0i64, 0, 0, 0, 0]
        )
        .unwrap();

        let (passed, report) = TableDriftDetector::ks(0.05).detect(&reference, &current).unwrap();

        assert!(!passed);
        let keys: Vec<&String> = report.columns.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(report.columns["a"].p_value, 1.0);
        assert!(!report.columns["a"].drift_status);
        assert!(report.columns["b"].drift_status);
        assert!(report.columns.values().all(|c| (0.0..=1.0).contains(&c.p_value)));
        assert_eq!(report.drifted_columns(), vec!["b"]);
    }

    #[test]
    fn test_no_drift_passes() {
        let reference = df!("a" => &[1.0f64, 2.0, 3.0, 4.0]).unwrap();
        let current = df!("a" => &[1.0f64, 2.0, 3.0, 4.0]).unwrap();
        let (passed, report) = TableDriftDetector::ks(0.05).detect(&reference, &current).unwrap();
        assert!(passed);
        assert!(report.passed());
    }

    #[test]
    fn test_missing_column_fails_fast() {
        let reference = df!("a" => &[1i64], "b" => &[2i64]).unwrap();
        let current = df!("a" => &[1i64]).unwrap();
        let result = TableDriftDetector::ks(0.05).detect(&reference, &current);
        assert!(matches!(result, Err(PhishnetError::ColumnNotFound(_))));
    }

    #[test]
    fn test_all_null_column_rejected() {
        let reference = df!("a" => &[None::<i64>, None]).unwrap();
        let current = df!("a" => &[Some(1i64), Some(2)]).unwrap();
        let result = TableDriftDetector::ks(0.05).detect(&reference, &current);
        assert!(matches!(result, Err(PhishnetError::EmptyDataset(_))));
    }

    #[test]
    fn test_text_column_rejected() {
        let reference = df!("a" => &[1i64, 2, 3]).unwrap();
        let current = df!("a" => &["oops", "garbage", "bad"]).unwrap();
        let result = TableDriftDetector::ks(0.05).detect(&reference, &current);
        assert!(matches!(result, Err(PhishnetError::SchemaError(_))));
    }

    #[test]
    fn test_report_yaml_shape() {
        let mut report = DriftReport::default();
        report.columns.insert(
            "URL_Length".to_string(),
            ColumnDrift {
                p_value: 0.5,
                drift_status: false,
            },
        );
        let yaml = serde_yaml::to_string(&report).unwrap();
        assert!(yaml.contains("URL_Length:"));
        assert!(yaml.contains("drift_status: false"));

        let parsed: DriftReport = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, report);
    }
}
