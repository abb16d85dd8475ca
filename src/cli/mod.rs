//! phishnet CLI
//!
//! Command-line interface for training, data upload, prediction and serving.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::inference::{PhishingModel, UrlClassifier, Verdict};
use crate::pipeline::TrainingPipeline;
use crate::store::{import_csv, open_store};
use crate::tracking::{LocalTracker, MetricsSink, NullSink};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "phishnet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Phishing URL classifier: training pipeline and prediction service")]
#[command(long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full training pipeline
    Train,

    /// Upload a CSV dataset into the configured document store
    Push {
        /// CSV file with a header row
        #[arg(long)]
        csv: PathBuf,
    },

    /// Classify a single URL with the final model
    Predict {
        #[arg(short, long)]
        url: String,

        /// Directory holding preprocessor.bin and model.bin
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },

    /// Start the prediction server
    Serve {
        /// Server host (falls back to API_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Server port (falls back to API_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    Ok(PipelineConfig::load(path)?)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    section("Train");

    let store = open_store(&config.store.uri)?;
    let sink: Arc<dyn MetricsSink> = if config.tracking.enabled {
        Arc::new(LocalTracker::new(config.tracking.dir.clone()))
    } else {
        Arc::new(NullSink)
    };

    step_run(&format!("Running pipeline {}", config.pipeline.name.cyan()));
    let start = Instant::now();
    let mut pipeline = TrainingPipeline::new(config, store, sink);
    let outcome = pipeline.run()?;
    step_done(&format!("{:.1?}", start.elapsed()));

    let model = &outcome.model;
    println!();
    kv("Run", &outcome.layout.run_dir().display().to_string());
    kv("Rows", &format!("{} train / {} test", outcome.ingestion.n_train, outcome.ingestion.n_test));
    if !outcome.validation.drifted_columns.is_empty() {
        kv("Drifted columns", &outcome.validation.drifted_columns.join(", "));
    }
    println!();
    println!("  {:<22} {:>10} {:>10}", muted("Candidate"), muted("CV"), muted("Test"));
    println!("  {}", dim(&"─".repeat(44)));
    for candidate in &model.candidates {
        println!(
            "  {:<22} {:>10.4} {:>10.4}",
            candidate.family.as_str(),
            candidate.cv_score,
            candidate.test_score
        );
    }
    println!("  {}", dim(&"─".repeat(44)));
    println!();
    println!("  {} {}", ok("best"), model.family.as_str().white().bold());
    kv("Test accuracy", &format!("{:.4}", model.test_metrics.accuracy));
    kv("Test F1", &format!("{:.4}", model.test_metrics.f1_score));
    kv("Model", &model.final_model_path.display().to_string());
    for err in &model.tracking_errors {
        println!("  {} {}", "tracking".yellow(), err);
    }
    println!();
    Ok(())
}

pub fn cmd_push(config_path: Option<&Path>, csv: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    section("Push");

    let store = open_store(&config.store.uri)?;
    step_run(&format!(
        "Importing {} into {}.{}",
        csv.display(),
        config.ingestion.database,
        config.ingestion.collection
    ));
    let inserted = import_csv(store.as_ref(), &config.ingestion.database, &config.ingestion.collection, csv)?;
    step_done(&format!("{} records", inserted));
    println!();
    Ok(())
}

pub fn cmd_predict(config_path: Option<&Path>, url: &str, model_dir: Option<&Path>) -> anyhow::Result<()> {
    let dir = match model_dir {
        Some(dir) => dir.to_path_buf(),
        None => load_config(config_path)?.pipeline.final_model_dir,
    };
    let model = Arc::new(PhishingModel::load_final(&dir)?);
    let classifier = UrlClassifier::lexical(model)?;
    let prediction = classifier.classify(url)?;

    let category = match prediction.category {
        Verdict::Safe => ok(prediction.category.as_str()),
        Verdict::Phishing => prediction.category.as_str().red().bold(),
    };
    println!();
    kv("URL", &prediction.url);
    println!("  {:<18} {} {}", muted("Verdict"), category, dim(&format!("(label {})", prediction.label)));
    println!();
    Ok(())
}

// ─── Serve ─────────────────────────────────────────────────────────────────────

pub async fn cmd_serve(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
    model_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let model_dir = match model_dir {
        Some(dir) => dir,
        None => load_config(config_path)?.pipeline.final_model_dir,
    };
    let mut config = ServerConfig::from_env(model_dir);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    section("Serve");
    kv("Predict", &format!("POST http://{}:{}/api/predict", config.host, config.port));
    kv("Health", &format!("GET  http://{}:{}/api/health", config.host, config.port));
    kv("Model", &config.model_dir.display().to_string());
    println!("  {}", dim("ctrl+c to stop"));
    println!();

    run_server(config).await
}
