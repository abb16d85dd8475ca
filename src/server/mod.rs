//! Prediction server
//!
//! JSON API over the final model: `POST /api/predict` classifies one URL,
//! `GET /api/health` reports the loaded model.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use handlers::PredictRequest;
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::inference::{PhishingModel, UrlClassifier};

/// Environment variable overriding the bind host
pub const ENV_API_HOST: &str = "API_HOST";
/// Environment variable overriding the bind port
pub const ENV_API_PORT: &str = "API_PORT";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding `preprocessor.bin` and `model.bin`
    pub model_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_dir: PathBuf::from("final_model"),
        }
    }
}

impl ServerConfig {
    /// Defaults with `API_HOST` / `API_PORT` applied; an unparsable port is ignored.
    pub fn from_env(model_dir: impl Into<PathBuf>) -> Self {
        Self::default()
            .with_model_dir(model_dir)
            .with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_model_dir(mut self, model_dir: impl Into<PathBuf>) -> Self {
        self.model_dir = model_dir.into();
        self
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_API_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_API_PORT).and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        self
    }
}

/// Load the final model and serve until ctrl+c
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    let model = Arc::new(PhishingModel::load_final(&config.model_dir)?);
    let classifier = UrlClassifier::lexical(model)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(config.clone(), classifier));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        address = %addr,
        model_dir = %config.model_dir.display(),
        pid = std::process::id(),
        "Server listening"
    );

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl+c");
            return;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.model_dir, PathBuf::from("final_model"));
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::default().with_overrides(|key| match key {
            ENV_API_HOST => Some("127.0.0.1".to_string()),
            ENV_API_PORT => Some("not-a-port".to_string()),
            _ => None,
        });
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
    }
}
