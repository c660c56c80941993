//! Liveness probe.

use axum::extract::State;
use axum::Json;
use exoscope_common::AppError;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub candidates: u64,
    pub datasets: u64,
    pub predictions: u64,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<Health>, AppError> {
    let stats = state.db.stats().await?;
    Ok(Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        candidates: stats.candidates,
        datasets: stats.datasets,
        predictions: stats.prediction_requests,
    }))
}
