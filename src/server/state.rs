//! Application state shared across handlers

use chrono::{DateTime, Utc};

use crate::inference::UrlClassifier;

use super::ServerConfig;

/// Read-only after startup
pub struct AppState {
    pub config: ServerConfig,
    pub classifier: UrlClassifier,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig, classifier: UrlClassifier) -> Self {
        Self {
            config,
            classifier,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.started_at).num_seconds()
    }
}
