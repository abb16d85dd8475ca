//! Ingestion: document store to feature-store snapshot and train/test split

use super::artifacts::{IngestionArtifact, RunLayout};
use crate::config::IngestionConfig;
use crate::error::{PhishnetError, Result};
use crate::store::{records_to_frame, DocumentStore};
use crate::utils::DataSaver;
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// Shuffle rows with a seeded RNG and cut off `ceil(n * test_ratio)` test rows.
pub fn train_test_split(df: &DataFrame, test_ratio: f64, seed: u64) -> Result<(DataFrame, DataFrame)> {
    let n = df.height();
    let n_test = (n as f64 * test_ratio).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PhishnetError::EmptyDataset(format!(
            "splitting {} rows at ratio {} leaves an empty side",
            n, test_ratio
        )));
    }

    let mut indices: Vec<IdxSize> = (0..n as IdxSize).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));

    let test_idx = IdxCa::from_vec("idx".into(), indices[..n_test].to_vec());
    let train_idx = IdxCa::from_vec("idx".into(), indices[n_test..].to_vec());
    Ok((df.take(&train_idx)?, df.take(&test_idx)?))
}

/// Pull the raw collection, persist the snapshot and the split.
pub fn ingest(
    config: &IngestionConfig,
    layout: &RunLayout,
    store: &dyn DocumentStore,
) -> Result<IngestionArtifact> {
    let records = store.fetch(&config.database, &config.collection)?;
    info!(
        database = %config.database,
        collection = %config.collection,
        records = records.len(),
        "Fetched raw records"
    );

    let mut df = records_to_frame(&records, &config.missing_sentinel)?;
    if df.height() == 0 {
        return Err(PhishnetError::EmptyDataset(format!(
            "collection {}.{} has no rows",
            config.database, config.collection
        )));
    }

    let feature_store_path = layout.feature_store_file(&config.feature_store_file);
    DataSaver::save_csv(&mut df, &feature_store_path)?;

    let (mut train, mut test) = train_test_split(&df, config.test_ratio, config.random_state)?;
    let train_path = layout.ingested_train();
    let test_path = layout.ingested_test();
    DataSaver::save_csv(&mut train, &train_path)?;
    DataSaver::save_csv(&mut test, &test_path)?;

    info!(
        rows = df.height(),
        train = train.height(),
        test = test.height(),
        path = %feature_store_path.display(),
        "Ingestion complete"
    );

    Ok(IngestionArtifact {
        feature_store_path,
        train_path,
        test_path,
        n_rows: df.height(),
        n_train: train.height(),
        n_test: test.height(),
    })
}
