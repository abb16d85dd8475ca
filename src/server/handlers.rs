//! Request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::inference::Prediction;

use super::error::{Result, ServerError};
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub url: String,
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<Prediction>> {
    let Json(request) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let url = request.url.trim();
    if url.is_empty() {
        return Err(ServerError::BadRequest("url must not be empty".to_string()));
    }

    let prediction = state.classifier.classify(url)?;
    info!(url = %prediction.url, category = %prediction.category, "Prediction served");
    Ok(Json(prediction))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let model = state.classifier.model();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": model.family().as_str(),
        "features": model.feature_names().len(),
        "uptime_secs": state.uptime_secs(),
    }))
}
