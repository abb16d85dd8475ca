//! Declared table schemas and the validator that checks tables against them

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{PhishnetError, Result};
use crate::utils::column_names;

/// How strictly a table must match its schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMode {
    /// Exact column order, and declared types must match
    Strict,
    /// Only the number of columns must match
    ColumnCount,
}

impl Default for SchemaMode {
    fn default() -> Self {
        SchemaMode::Strict
    }
}

/// One declared column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Canonical type name, `None` skips the type check
    pub dtype: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ColumnEntry {
    Name(String),
    Typed(BTreeMap<String, Option<String>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaFile {
    columns: Vec<ColumnEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    numerical_columns: Vec<String>,
}

/// Ordered column declarations loaded from a YAML schema file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
    numerical_columns: Vec<String>,
}

impl Schema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<S>)>,
        S: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, dtype)| ColumnSpec {
                    name: name.into(),
                    dtype: dtype.map(|d| {
                        let declared: String = d.into();
                        canonical_type(&declared)
                    }),
                })
                .collect(),
            numerical_columns: Vec::new(),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: SchemaFile = serde_yaml::from_str(content)
            .map_err(|e| PhishnetError::SchemaError(format!("invalid schema document: {}", e)))?;

        let mut columns = Vec::with_capacity(file.columns.len());
        for entry in file.columns {
            match entry {
                ColumnEntry::Name(name) => columns.push(ColumnSpec { name, dtype: None }),
                ColumnEntry::Typed(map) => {
                    if map.len() != 1 {
                        return Err(PhishnetError::SchemaError(format!(
                            "column entry must have exactly one name, found {}",
                            map.len()
                        )));
                    }
                    for (name, dtype) in map {
                        columns.push(ColumnSpec {
                            name,
                            dtype: dtype.map(|d| canonical_type(&d)),
                        });
                    }
                }
            }
        }

        Ok(Self {
            columns,
            numerical_columns: file.numerical_columns,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PhishnetError::IoError(std::io::Error::new(
                e.kind(),
                format!("schema {}: {}", path.display(), e),
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        let file = SchemaFile {
            columns: self
                .columns
                .iter()
                .map(|c| {
                    let mut entry = BTreeMap::new();
                    entry.insert(c.name.clone(), c.dtype.clone());
                    ColumnEntry::Typed(entry)
                })
                .collect(),
            numerical_columns: self.numerical_columns.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn numerical_columns(&self) -> &[String] {
        &self.numerical_columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A single reason a table does not match its schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaMismatch {
    NoColumns,
    ColumnCount { expected: usize, actual: usize },
    WrongName { position: usize, expected: String, actual: String },
    MissingColumn { position: usize, expected: String },
    UnexpectedColumn { position: usize, actual: String },
    WrongType { column: String, expected: String, actual: String },
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaMismatch::NoColumns => write!(f, "table has no columns"),
            SchemaMismatch::ColumnCount { expected, actual } => {
                write!(f, "expected {} columns, found {}", expected, actual)
            }
            SchemaMismatch::WrongName { position, expected, actual } => write!(
                f,
                "column {} should be '{}', found '{}'",
                position, expected, actual
            ),
            SchemaMismatch::MissingColumn { position, expected } => {
                write!(f, "column {} '{}' is missing", position, expected)
            }
            SchemaMismatch::UnexpectedColumn { position, actual } => {
                write!(f, "unexpected column {} '{}'", position, actual)
            }
            SchemaMismatch::WrongType { column, expected, actual } => write!(
                f,
                "column '{}' should be {}, found {}",
                column, expected, actual
            ),
        }
    }
}

/// Outcome of checking one table
#[derive(Debug, Clone)]
pub struct SchemaReport {
    pub expected_columns: Vec<String>,
    pub actual_columns: Vec<String>,
    pub mismatches: Vec<SchemaMismatch>,
}

impl SchemaReport {
    pub fn is_valid(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Checks tables against a [`Schema`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator {
    mode: SchemaMode,
}

impl SchemaValidator {
    pub fn new(mode: SchemaMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SchemaMode {
        self.mode
    }

    /// `true` iff the table matches the schema
    pub fn validate(&self, df: &DataFrame, schema: &Schema) -> bool {
        self.check(df, schema).is_valid()
    }

    /// Full comparison; every column is scanned so all mismatches are listed.
    pub fn check(&self, df: &DataFrame, schema: &Schema) -> SchemaReport {
        let actual_columns = column_names(df);
        let expected_columns = schema.column_names();
        let mut mismatches = Vec::new();

        if actual_columns.is_empty() {
            mismatches.push(SchemaMismatch::NoColumns);
            return SchemaReport {
                expected_columns,
                actual_columns,
                mismatches,
            };
        }

        match self.mode {
            SchemaMode::ColumnCount => {
                if actual_columns.len() != expected_columns.len() {
                    mismatches.push(SchemaMismatch::ColumnCount {
                        expected: expected_columns.len(),
                        actual: actual_columns.len(),
                    });
                }
            }
            SchemaMode::Strict => {
                let width = actual_columns.len().max(expected_columns.len());
                for position in 0..width {
                    match (expected_columns.get(position), actual_columns.get(position)) {
                        (Some(expected), Some(actual)) if expected != actual => {
                            mismatches.push(SchemaMismatch::WrongName {
                                position,
                                expected: expected.clone(),
                                actual: actual.clone(),
                            });
                        }
                        (Some(expected), None) => {
                            mismatches.push(SchemaMismatch::MissingColumn {
                                position,
                                expected: expected.clone(),
                            });
                        }
                        (None, Some(actual)) => {
                            mismatches.push(SchemaMismatch::UnexpectedColumn {
                                position,
                                actual: actual.clone(),
                            });
                        }
                        _ => {}
                    }
                }

                for spec in schema.columns() {
                    let (Some(expected), Ok(column)) = (&spec.dtype, df.column(&spec.name)) else {
                        continue;
                    };
                    let actual = dtype_name(column.dtype());
                    if &actual != expected {
                        mismatches.push(SchemaMismatch::WrongType {
                            column: spec.name.clone(),
                            expected: expected.clone(),
                            actual,
                        });
                    }
                }
            }
        }

        SchemaReport {
            expected_columns,
            actual_columns,
            mismatches,
        }
    }
}

/// Canonical name of a runtime column type
pub fn dtype_name(dtype: &DataType) -> String {
    match dtype {
        DataType::Int8 => "int8".to_string(),
        DataType::Int16 => "int16".to_string(),
        DataType::Int32 => "int32".to_string(),
        DataType::Int64 => "int64".to_string(),
        DataType::UInt8 => "uint8".to_string(),
        DataType::UInt16 => "uint16".to_string(),
        DataType::UInt32 => "uint32".to_string(),
        DataType::UInt64 => "uint64".to_string(),
        DataType::Float32 => "float32".to_string(),
        DataType::Float64 => "float64".to_string(),
        DataType::String => "str".to_string(),
        DataType::Boolean => "bool".to_string(),
        other => other.to_string().to_lowercase(),
    }
}

/// Normalize a declared type name, accepting common spellings
fn canonical_type(declared: &str) -> String {
    let lowered = declared.trim().to_lowercase();
    match lowered.as_str() {
        "int" | "integer" | "i64" => "int64".to_string(),
        "float" | "double" | "f64" => "float64".to_string(),
        "string" | "utf8" | "object" => "str".to_string(),
        "boolean" => "bool".to_string(),
        _ => lowered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc_schema() -> Schema {
        Schema::new(vec![("A", Some("int64")), ("B", Some("int64")), ("Result", Some("int64"))])
    }

    #[test]
    fn test_exact_match_passes() {
        let df = df!(
            "A" => &[1i64, 2],
            "B" => &[3i64, 4],
            "Result" => &[1i64, -1]
        )
        .unwrap();

        let validator = SchemaValidator::new(SchemaMode::Strict);
        assert!(validator.validate(&df, &abc_schema()));
    }

    #[test]
    fn test_renamed_column_fails() {
        let df = df!(
            "A" => &[1i64, 2],
            "C" => &[3i64, 4],
            "Result" => &[1i64, -1]
        )
        .unwrap();

        let report = SchemaValidator::new(SchemaMode::Strict).check(&df, &abc_schema());
        assert!(!report.is_valid());
        assert_eq!(
            report.mismatches,
            vec![SchemaMismatch::WrongName {
                position: 1,
                expected: "B".to_string(),
                actual: "C".to_string(),
            }]
        );
    }

    #[test]
    fn test_reordered_columns_fail() {
        let df = df!(
            "B" => &[3i64, 4],
            "A" => &[1i64, 2],
            "Result" => &[1i64, -1]
        )
        .unwrap();

        let report = SchemaValidator::new(SchemaMode::Strict).check(&df, &abc_schema());
        assert_eq!(report.mismatches.len(), 2);
    }

    #[test]
    fn test_type_mismatch_reported_per_column() {
        let df = df!(
            "A" => &[1.5f64, 2.5],
            "B" => &["x", "y"],
            "Result" => &[1i64, -1]
        )
        .unwrap();

        let report = SchemaValidator::new(SchemaMode::Strict).check(&df, &abc_schema());
        let wrong_types = report
            .mismatches
            .iter()
            .filter(|m| matches!(m, SchemaMismatch::WrongType { .. }))
            .count();
        assert_eq!(wrong_types, 2);
    }

    #[test]
    fn test_column_count_mode_ignores_names() {
        let df = df!(
            "x" => &[1i64],
            "y" => &[2i64],
            "z" => &[3i64]
        )
        .unwrap();

        assert!(SchemaValidator::new(SchemaMode::ColumnCount).validate(&df, &abc_schema()));
        assert!(!SchemaValidator::new(SchemaMode::Strict).validate(&df, &abc_schema()));
    }

    #[test]
    fn test_extra_and_missing_columns() {
        let df = df!(
            "A" => &[1i64],
            "B" => &[2i64]
        )
        .unwrap();
        let report = SchemaValidator::new(SchemaMode::Strict).check(&df, &abc_schema());
        assert!(report
            .mismatches
            .contains(&SchemaMismatch::MissingColumn { position: 2, expected: "Result".to_string() }));

        let wide = df!(
            "A" => &[1i64],
            "B" => &[2i64],
            "Result" => &[1i64],
            "extra" => &[0i64]
        )
        .unwrap();
        let report = SchemaValidator::new(SchemaMode::Strict).check(&wide, &abc_schema());
        assert_eq!(report.mismatches.len(), 1);
    }

    #[test]
    fn test_empty_table_fails() {
        let df = DataFrame::empty();
        let report = SchemaValidator::default().check(&df, &abc_schema());
        assert_eq!(report.mismatches, vec![SchemaMismatch::NoColumns]);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let df = df!("A" => &[1i64], "C" => &[2i64], "Result" => &[1i64]).unwrap();
        let validator = SchemaValidator::default();
        let first = validator.validate(&df, &abc_schema());
        for _ in 0..5 {
            assert_eq!(validator.validate(&df, &abc_schema()), first);
        }
    }

    #[test]
    fn test_yaml_parsing() {
        let schema = Schema::from_yaml_str(
            r#"
columns:
  - having_IP_Address: int64
  - URL_Length: ~
  - Result
numerical_columns:
  - having_IP_Address
"#,
        )
        .unwrap();

        assert_eq!(schema.column_names(), vec!["having_IP_Address", "URL_Length", "Result"]);
        assert_eq!(schema.columns()[0].dtype.as_deref(), Some("int64"));
        assert_eq!(schema.columns()[1].dtype, None);
        assert_eq!(schema.numerical_columns(), &["having_IP_Address".to_string()]);
    }

    #[test]
    fn test_yaml_round_trip_keeps_order() {
        let schema = abc_schema();
        let text = schema.to_yaml_string().unwrap();
        let parsed = Schema::from_yaml_str(&text).unwrap();
        assert_eq!(parsed, schema);
    }

    #[test]
    fn test_type_aliases() {
        let schema = Schema::new(vec![("a", Some("Integer")), ("b", Some("string"))]);
        assert_eq!(schema.columns()[0].dtype.as_deref(), Some("int64"));
        assert_eq!(schema.columns()[1].dtype.as_deref(), Some("str"));
    }
}
