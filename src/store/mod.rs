//! Raw record store
//!
//! Training data starts life as JSON documents grouped by database and
//! collection. `LocalDocumentStore` keeps each collection as a JSON-lines file
//! under `<root>/<database>/<collection>.jsonl`.

use crate::error::{PhishnetError, Result};
use crate::utils::DataLoader;
use polars::prelude::*;
use serde_json::{Map, Number, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One raw document
pub type Record = Map<String, Value>;

/// Field added by the store to every inserted document
pub const ID_FIELD: &str = "_id";

/// Boundary to the raw document source
pub trait DocumentStore: Send + Sync {
    /// All documents of a collection, in insertion order
    fn fetch(&self, database: &str, collection: &str) -> Result<Vec<Record>>;

    /// Append documents; returns how many were written
    fn insert_many(&self, database: &str, collection: &str, records: &[Record]) -> Result<usize>;
}

/// JSON-lines files on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, database: &str, collection: &str) -> PathBuf {
        self.root.join(database).join(format!("{}.jsonl", collection))
    }

    fn count_lines(path: &Path) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let reader = BufReader::new(File::open(path)?);
        let mut count = 0;
        for line in reader.lines() {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl DocumentStore for LocalDocumentStore {
    fn fetch(&self, database: &str, collection: &str) -> Result<Vec<Record>> {
        if !self.root.is_dir() {
            return Err(PhishnetError::StoreError(format!(
                "store root {} is not reachable",
                self.root.display()
            )));
        }
        let path = self.collection_path(database, collection);
        if !path.exists() {
            debug!(path = %path.display(), "Collection file absent");
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line)? {
                Value::Object(map) => records.push(map),
                _ => {
                    return Err(PhishnetError::StoreError(format!(
                        "{}:{}: document is not a JSON object",
                        path.display(),
                        line_no + 1
                    )))
                }
            }
        }
        Ok(records)
    }

    fn insert_many(&self, database: &str, collection: &str, records: &[Record]) -> Result<usize> {
        let path = self.collection_path(database, collection);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let offset = Self::count_lines(&path)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        for (i, record) in records.iter().enumerate() {
            let mut doc = Record::new();
            if !record.contains_key(ID_FIELD) {
                doc.insert(ID_FIELD.to_string(), Value::String(format!("{:024x}", offset + i)));
            }
            doc.extend(record.iter().map(|(k, v)| (k.clone(), v.clone())));
            serde_json::to_writer(&mut writer, &Value::Object(doc))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        info!(path = %path.display(), count = records.len(), "Inserted documents");
        Ok(records.len())
    }
}

/// Open a store from its URI: `file://<dir>` or a bare directory path.
pub fn open_store(uri: &str) -> Result<Arc<dyn DocumentStore>> {
    let path = match uri.split_once("://") {
        Some(("file", rest)) => rest,
        Some((scheme, _)) => {
            return Err(PhishnetError::ConfigError(format!(
                "unsupported store scheme '{}' in {}",
                scheme, uri
            )))
        }
        None => uri,
    };
    if path.is_empty() {
        return Err(PhishnetError::ConfigError("store uri has no path".to_string()));
    }
    Ok(Arc::new(LocalDocumentStore::new(path)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

fn infer_kind<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for v in values {
        let this = match v {
            Value::Null => continue,
            Value::Number(n) if n.is_i64() || n.is_u64() => ColumnKind::Int,
            Value::Number(_) => ColumnKind::Float,
            Value::Bool(_) => ColumnKind::Bool,
            _ => ColumnKind::Text,
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Int), ColumnKind::Float) | (Some(ColumnKind::Float), ColumnKind::Int) => {
                ColumnKind::Float
            }
            _ => ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Float)
}

fn value_to_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Convert records to a table.
///
/// Columns follow the first record's field order, extended by fields first
/// seen later. `_id` is dropped and string values equal to `missing_sentinel`
/// become null.
pub fn records_to_frame(records: &[Record], missing_sentinel: &str) -> Result<DataFrame> {
    let mut names: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if key != ID_FIELD && !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }

    let null = Value::Null;
    let mut columns: Vec<Column> = Vec::with_capacity(names.len());
    for name in &names {
        let cells: Vec<&Value> = records
            .iter()
            .map(|r| match r.get(name) {
                Some(Value::String(s)) if s == missing_sentinel => &null,
                Some(v) => v,
                None => &null,
            })
            .collect();

        let series = match infer_kind(cells.iter().copied()) {
            ColumnKind::Int => {
                let values: Vec<Option<i64>> = cells.iter().map(|v| v.as_i64()).collect();
                Series::new(name.as_str().into(), values)
            }
            ColumnKind::Float => {
                let values: Vec<Option<f64>> = cells.iter().map(|v| v.as_f64()).collect();
                Series::new(name.as_str().into(), values)
            }
            ColumnKind::Bool => {
                let values: Vec<Option<bool>> = cells.iter().map(|v| v.as_bool()).collect();
                Series::new(name.as_str().into(), values)
            }
            ColumnKind::Text => {
                let values: Vec<Option<String>> = cells.iter().map(|v| value_to_text(v)).collect();
                Series::new(name.as_str().into(), values)
            }
        };
        columns.push(series.into());
    }

    Ok(DataFrame::new(columns)?)
}

/// Convert a table back into records, one per row
pub fn frame_to_records(df: &DataFrame) -> Result<Vec<Record>> {
    let mut records: Vec<Record> = (0..df.height()).map(|_| Record::new()).collect();

    for column in df.get_columns() {
        let name = column.name().to_string();
        let values: Vec<Value> = match column.dtype() {
            DataType::Boolean => column.bool()?.into_iter().map(|v| v.map_or(Value::Null, Value::Bool)).collect(),
            dt if dt.is_integer() => column
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, |x| Value::Number(x.into())))
                .collect(),
            dt if dt.is_float() => column
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|v| v.and_then(Number::from_f64).map_or(Value::Null, Value::Number))
                .collect(),
            _ => column
                .cast(&DataType::String)?
                .str()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, |s| Value::String(s.to_string())))
                .collect(),
        };
        for (record, value) in records.iter_mut().zip(values) {
            record.insert(name.clone(), value);
        }
    }
    Ok(records)
}

/// Load a CSV file and append its rows to a collection
pub fn import_csv(store: &dyn DocumentStore, database: &str, collection: &str, path: &Path) -> Result<usize> {
    let df = DataLoader::new().load_csv(path)?;
    let records = frame_to_records(&df)?;
    info!(
        path = %path.display(),
        rows = records.len(),
        database,
        collection,
        "Importing CSV into store"
    );
    store.insert_many(database, collection, &records)
}
