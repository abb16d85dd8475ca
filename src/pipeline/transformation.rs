//! Transformation: fit the KNN imputation pipeline and persist model-ready arrays

use super::artifacts::{RunLayout, TransformationArtifact, ValidationArtifact};
use crate::config::TransformationConfig;
use crate::error::{PhishnetError, Result};
use crate::export::{save_object, ObjectKind};
use crate::imputation::KNNImputer;
use crate::preprocessing::Preprocessor;
use crate::utils::{column_names, column_to_vec, columns_to_array2, DataLoader};
use ndarray::{concatenate, s, Array1, Array2, Axis};
use polars::prelude::DataFrame;
use tracing::info;

/// Map raw labels onto {0, 1}: -1 becomes 0, anything else outside {0, 1}
/// is rejected.
pub fn normalize_target(values: &[f64], column: &str) -> Result<Array1<f64>> {
    values
        .iter()
        .map(|&v| match v {
            v if v == -1.0 || v == 0.0 => Ok(0.0),
            v if v == 1.0 => Ok(1.0),
            other => Err(PhishnetError::InvalidLabel {
                column: column.to_string(),
                value: other,
            }),
        })
        .collect()
}

/// Feature matrix and normalized target of a table
pub fn split_features_target(df: &DataFrame, target: &str) -> Result<(Vec<String>, Array2<f64>, Array1<f64>)> {
    let names = column_names(df);
    if !names.iter().any(|n| n == target) {
        return Err(PhishnetError::ColumnNotFound(target.to_string()));
    }
    let features: Vec<String> = names.into_iter().filter(|n| n != target).collect();
    let x = columns_to_array2(df, &features)?;
    let y = normalize_target(&column_to_vec(df, target)?, target)?;
    Ok((features, x, y))
}

/// Append the target as the trailing column
pub fn join_target(x: &Array2<f64>, y: &Array1<f64>) -> Result<Array2<f64>> {
    let y_col = y.view().insert_axis(Axis(1));
    Ok(concatenate(Axis(1), &[x.view(), y_col])?)
}

/// Inverse of [`join_target`]
pub fn split_target(data: &Array2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    if data.ncols() < 2 {
        return Err(PhishnetError::ShapeError {
            expected: "at least one feature and a target column".to_string(),
            actual: format!("{} columns", data.ncols()),
        });
    }
    let last = data.ncols() - 1;
    Ok((data.slice(s![.., ..last]).to_owned(), data.column(last).to_owned()))
}

/// Fit the imputer on the training features and write the transformed arrays
/// and preprocessor. Only writes under the run directory; the final-model
/// copy is published by the trainer.
pub fn transform(
    validation: &ValidationArtifact,
    config: &TransformationConfig,
    layout: &RunLayout,
) -> Result<TransformationArtifact> {
    let (train_path, test_path) = match (&validation.valid_train_path, &validation.valid_test_path) {
        (Some(train), Some(test)) => (train, test),
        _ => {
            return Err(PhishnetError::SchemaError(
                "no validated tables to transform".to_string(),
            ))
        }
    };

    let loader = DataLoader::new();
    let train = loader.load_csv(train_path)?;
    let test = loader.load_csv(test_path)?;

    let (train_features, x_train, y_train) = split_features_target(&train, &config.target_column)?;
    let (test_features, x_test, y_test) = split_features_target(&test, &config.target_column)?;
    if train_features != test_features {
        return Err(PhishnetError::SchemaError(format!(
            "train features {:?} differ from test features {:?}",
            train_features, test_features
        )));
    }

    let imputer = KNNImputer::new(config.n_neighbors)
        .with_weights(config.weights)
        .with_missing_value(config.missing_value);
    let mut preprocessor = Preprocessor::knn(train_features.clone(), imputer);
    preprocessor.fit(&x_train)?;

    let train_arr = join_target(&preprocessor.transform(&x_train)?, &y_train)?;
    let test_arr = join_target(&preprocessor.transform(&x_test)?, &y_test)?;

    let transformed_train_path = layout.transformed_train();
    let transformed_test_path = layout.transformed_test();
    let preprocessor_path = layout.preprocessor();
    save_object(&transformed_train_path, ObjectKind::Array, &train_arr)?;
    save_object(&transformed_test_path, ObjectKind::Array, &test_arr)?;
    save_object(&preprocessor_path, ObjectKind::Preprocessor, &preprocessor)?;

    info!(
        features = train_features.len(),
        train_rows = train_arr.nrows(),
        test_rows = test_arr.nrows(),
        path = %preprocessor_path.display(),
        "Transformation complete"
    );

    Ok(TransformationArtifact {
        transformed_train_path,
        transformed_test_path,
        preprocessor_path,
        feature_names: train_features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use polars::prelude::*;

    #[test]
    fn test_normalize_target() {
        let y = normalize_target(&[-1.0, 1.0, 0.0], "Result").unwrap();
        assert_eq!(y, array![0.0, 1.0, 0.0]);

        let err = normalize_target(&[1.0, 2.0], "Result").unwrap_err();
        assert!(matches!(err, PhishnetError::InvalidLabel { value, .. } if value == 2.0));
        assert!(normalize_target(&[f64::NAN], "Result").is_err());
    }

    #[test]
    fn test_split_features_target() {
        let df = df!(
            "a" => &[1i64, 2],
            "Result" => &[-1i64, 1],
            "b" => &[3i64, 4]
        )
        .unwrap();
        let (features, x, y) = split_features_target(&df, "Result").unwrap();
        assert_eq!(features, vec!["a", "b"]);
        assert_eq!(x, array![[1.0, 3.0], [2.0, 4.0]]);
        assert_eq!(y, array![0.0, 1.0]);

        assert!(matches!(
            split_features_target(&df, "label"),
            Err(PhishnetError::ColumnNotFound(_))
        ));
    }

    fn validated_tables(dir: &std::path::Path, mut train: DataFrame, mut test: DataFrame) -> (RunLayout, ValidationArtifact) {
        let layout = RunLayout::at(dir.join("run"), dir.join("final_model"));
        let train_path = dir.join("valid_train.csv");
        let test_path = dir.join("valid_test.csv");
        crate::utils::DataSaver::save_csv(&mut train, &train_path).unwrap();
        crate::utils::DataSaver::save_csv(&mut test, &test_path).unwrap();
        let artifact = ValidationArtifact {
            validation_status: true,
            schema_valid: true,
            drift_status: Some(true),
            valid_train_path: Some(train_path),
            valid_test_path: Some(test_path),
            invalid_train_path: None,
            invalid_test_path: None,
            drift_report_path: None,
            drifted_columns: Vec::new(),
            schema_mismatches: Vec::new(),
        };
        (layout, artifact)
    }

    #[test]
    fn test_configured_missing_marker_is_imputed() {
        let dir = tempfile::tempdir().unwrap();
        let train = df!(
            "a" => &[1i64, 2, 3, -999],
            "b" => &[1i64, 2, 3, 4],
            "Result" => &[1i64, -1, 1, -1]
        )
        .unwrap();
        let test = df!("a" => &[1i64, 2], "b" => &[1i64, 2], "Result" => &[1i64, -1]).unwrap();
        let (layout, validation) = validated_tables(dir.path(), train, test);
        let config = TransformationConfig {
            missing_value: -999.0,
            ..Default::default()
        };

        let artifact = transform(&validation, &config, &layout).unwrap();
        let data: Array2<f64> = crate::export::load_object(&artifact.transformed_train_path, ObjectKind::Array).unwrap();

        // Mean of the three donors
        assert_eq!(data[[3, 0]], 2.0);
        assert_eq!(data[[3, 2]], 0.0);
        assert!(!layout.final_model_dir().exists());
    }

    #[test]
    fn test_text_feature_cells_fail() {
        let dir = tempfile::tempdir().unwrap();
        let train = df!(
            "a" => &[1i64, 2, 3],
            "B" => &["oops", "garbage", "bad"],
            "Result" => &[1i64, -1, 1]
        )
        .unwrap();
        let test = df!("a" => &[1i64, 2], "B" => &[1i64, 2], "Result" => &[1i64, -1]).unwrap();
        let (layout, validation) = validated_tables(dir.path(), train, test);

        let err = transform(&validation, &TransformationConfig::default(), &layout).unwrap_err();
        assert!(matches!(err, PhishnetError::SchemaError(ref msg) if msg.contains("column B")));
        assert!(!layout.transformed_train().exists());
    }

    #[test]
    fn test_target_column_round_trip() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![0.0, 1.0];
        let joined = join_target(&x, &y).unwrap();
        assert_eq!(joined.ncols(), 3);

        let (x2, y2) = split_target(&joined).unwrap();
        assert_eq!(x2, x);
        assert_eq!(y2, y);
    }
}
