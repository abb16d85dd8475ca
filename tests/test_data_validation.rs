//! Integration test: schema checks, drift detection and the validation stage

use phishnet::config::ValidationConfig;
use phishnet::drift::TableDriftDetector;
use phishnet::export::load_yaml;
use phishnet::pipeline::validation::validate_with_schema;
use phishnet::pipeline::{IngestionArtifact, RunLayout};
use phishnet::schema::{Schema, SchemaMode, SchemaValidator};
use phishnet::utils::DataSaver;
use polars::prelude::*;
use std::path::Path;

fn abr_schema() -> Schema {
    Schema::new([("A", Some("int64")), ("B", Some("int64")), ("Result", Some("int64"))])
}

fn write_split(dir: &Path, mut train: DataFrame, mut test: DataFrame) -> (RunLayout, IngestionArtifact) {
    let layout = RunLayout::at(dir.join("run"), dir.join("final_model"));
    let train_path = layout.ingested_train();
    let test_path = layout.ingested_test();
    DataSaver::save_csv(&mut train, &train_path).unwrap();
    DataSaver::save_csv(&mut test, &test_path).unwrap();

    let artifact = IngestionArtifact {
        feature_store_path: layout.feature_store_file("phishing_data.csv"),
        train_path,
        test_path,
        n_rows: train.height() + test.height(),
        n_train: train.height(),
        n_test: test.height(),
    };
    (layout, artifact)
}

#[test]
fn test_schema_column_names() {
    let validator = SchemaValidator::new(SchemaMode::Strict);
    let good = df!("A" => &[1i64, 2], "B" => &[3i64, 4], "Result" => &[1i64, -1]).unwrap();
    let renamed = df!("A" => &[1i64, 2], "C" => &[3i64, 4], "Result" => &[1i64, -1]).unwrap();

    assert!(validator.validate(&good, &abr_schema()));
    assert!(!validator.validate(&renamed, &abr_schema()));
    // Deterministic
    assert_eq!(
        validator.check(&renamed, &abr_schema()).mismatches,
        validator.check(&renamed, &abr_schema()).mismatches
    );
}

#[test]
fn test_column_count_mode_ignores_names() {
    let validator = SchemaValidator::new(SchemaMode::ColumnCount);
    let renamed = df!("A" => &[1i64], "C" => &[3i64], "Result" => &[1i64]).unwrap();
    let short = df!("A" => &[1i64], "Result" => &[1i64]).unwrap();

    assert!(validator.validate(&renamed, &abr_schema()));
    assert!(!validator.validate(&short, &abr_schema()));
}

#[test]
fn test_drift_report_covers_reference_columns() {
    let reference = df!("same" => &[1i64, 1, 1, 1, 1], "shifted" => &[1i64, 2, 3, 4, 5]).unwrap();
    let current = df!("same" => &[1i64, 1, 1, 1, 1], "shifted" => &[100i64, 200, 300, 400, 500]).unwrap();

    let (passed, report) = TableDriftDetector::ks(0.05).detect(&reference, &current).unwrap();

    assert!(!passed);
    assert_eq!(report.len(), 2);
    assert_eq!(report.drifted_columns(), vec!["shifted"]);
    assert_eq!(report.columns["same"].p_value, 1.0);
    assert!(!report.columns["same"].drift_status);
    assert!(report.columns["shifted"].p_value < 0.05);
    assert!(report.columns.values().all(|c| (0.0..=1.0).contains(&c.p_value)));
}

#[test]
fn test_validation_writes_valid_branch_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let train = df!("A" => &[1i64, 2, 3, 4, 5], "B" => &[1i64, -1, 1, -1, 1], "Result" => &[1i64, -1, 1, -1, 1]).unwrap();
    let test = df!("A" => &[100i64, 200, 300, 400, 500], "B" => &[1i64, -1, 1, -1, 1], "Result" => &[-1i64, 1, -1, 1, -1]).unwrap();
    let (layout, ingestion) = write_split(dir.path(), train, test);

    let artifact = validate_with_schema(&ingestion, &abr_schema(), &ValidationConfig::default(), &layout).unwrap();

    assert!(artifact.schema_valid);
    assert_eq!(artifact.drift_status, Some(false));
    assert!(!artifact.validation_status);
    assert_eq!(artifact.drifted_columns, vec!["A".to_string()]);
    assert!(artifact.valid_train_path.as_ref().unwrap().exists());
    assert!(artifact.valid_test_path.as_ref().unwrap().exists());
    assert!(artifact.invalid_train_path.is_none());

    let report_path = artifact.drift_report_path.unwrap();
    let report: serde_yaml::Value = load_yaml(&report_path).unwrap();
    assert!(report["A"]["drift_status"].as_bool().unwrap());
    assert!(!report["B"]["drift_status"].as_bool().unwrap());
}

#[test]
fn test_validation_writes_invalid_branch() {
    let dir = tempfile::tempdir().unwrap();
    let train = df!("A" => &[1i64, 2], "C" => &[3i64, 4], "Result" => &[1i64, -1]).unwrap();
    let test = df!("A" => &[1i64, 2], "C" => &[3i64, 4], "Result" => &[1i64, -1]).unwrap();
    let (layout, ingestion) = write_split(dir.path(), train, test);

    let artifact = validate_with_schema(&ingestion, &abr_schema(), &ValidationConfig::default(), &layout).unwrap();

    assert!(!artifact.validation_status);
    assert!(!artifact.schema_valid);
    assert_eq!(artifact.drift_status, None);
    assert!(artifact.valid_train_path.is_none());
    assert!(artifact.drift_report_path.is_none());
    assert!(artifact.invalid_train_path.as_ref().unwrap().exists());
    assert!(artifact.invalid_test_path.as_ref().unwrap().exists());
    assert!(artifact.schema_mismatches[0].starts_with("train: "));
}

#[test]
fn test_shipped_schema_lists_thirty_features() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data_schema").join("schema.yaml");
    let schema = Schema::from_file(&path).unwrap();

    assert_eq!(schema.len(), 31);
    assert_eq!(schema.column_names().last().map(String::as_str), Some("Result"));
    assert_eq!(schema.numerical_columns().len(), 31);
}
