//! Validation: schema check, then drift between the train and test splits

use super::artifacts::{IngestionArtifact, RunLayout, ValidationArtifact};
use crate::config::ValidationConfig;
use crate::drift::TableDriftDetector;
use crate::error::Result;
use crate::export::save_yaml;
use crate::schema::{Schema, SchemaReport, SchemaValidator};
use crate::utils::{DataLoader, DataSaver};
use tracing::{info, warn};

fn log_report(split: &str, report: &SchemaReport) {
    info!(
        split,
        expected = ?report.expected_columns,
        actual = ?report.actual_columns,
        valid = report.is_valid(),
        "Schema check"
    );
    for mismatch in &report.mismatches {
        warn!(split, "Schema mismatch: {}", mismatch);
    }
}

/// Check the ingested splits against the schema file named in `config`.
pub fn validate(
    ingestion: &IngestionArtifact,
    config: &ValidationConfig,
    layout: &RunLayout,
) -> Result<ValidationArtifact> {
    let schema = Schema::from_file(&config.schema_path)?;
    validate_with_schema(ingestion, &schema, config, layout)
}

/// Same as [`validate`] with an already loaded schema.
pub fn validate_with_schema(
    ingestion: &IngestionArtifact,
    schema: &Schema,
    config: &ValidationConfig,
    layout: &RunLayout,
) -> Result<ValidationArtifact> {
    let loader = DataLoader::new();
    let mut train = loader.load_csv(&ingestion.train_path)?;
    let mut test = loader.load_csv(&ingestion.test_path)?;

    let validator = SchemaValidator::new(config.schema_mode);
    let train_report = validator.check(&train, schema);
    let test_report = validator.check(&test, schema);
    log_report("train", &train_report);
    log_report("test", &test_report);

    if !(train_report.is_valid() && test_report.is_valid()) {
        let invalid_train = layout.invalid_train();
        let invalid_test = layout.invalid_test();
        DataSaver::save_csv(&mut train, &invalid_train)?;
        DataSaver::save_csv(&mut test, &invalid_test)?;

        let schema_mismatches = train_report
            .mismatches
            .iter()
            .map(|m| format!("train: {}", m))
            .chain(test_report.mismatches.iter().map(|m| format!("test: {}", m)))
            .collect();

        warn!(path = %invalid_train.display(), "Schema validation failed, tables moved to invalid branch");
        return Ok(ValidationArtifact {
            validation_status: false,
            schema_valid: false,
            drift_status: None,
            valid_train_path: None,
            valid_test_path: None,
            invalid_train_path: Some(invalid_train),
            invalid_test_path: Some(invalid_test),
            drift_report_path: None,
            drifted_columns: Vec::new(),
            schema_mismatches,
        });
    }

    let detector = TableDriftDetector::ks(config.drift_threshold);
    let (passed, report) = detector.detect(&train, &test)?;
    let report_path = layout.drift_report();
    save_yaml(&report_path, &report)?;

    let drifted_columns: Vec<String> = report.drifted_columns().into_iter().map(String::from).collect();
    if passed {
        info!(columns = report.len(), path = %report_path.display(), "No drift detected");
    } else {
        warn!(drifted = ?drifted_columns, path = %report_path.display(), "Drift detected");
    }

    let valid_train = layout.valid_train();
    let valid_test = layout.valid_test();
    DataSaver::save_csv(&mut train, &valid_train)?;
    DataSaver::save_csv(&mut test, &valid_test)?;

    Ok(ValidationArtifact {
        validation_status: passed,
        schema_valid: true,
        drift_status: Some(passed),
        valid_train_path: Some(valid_train),
        valid_test_path: Some(valid_test),
        invalid_train_path: None,
        invalid_test_path: None,
        drift_report_path: Some(report_path),
        drifted_columns,
        schema_mismatches: Vec::new(),
    })
}
