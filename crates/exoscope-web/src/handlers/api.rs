//! JSON API mirroring the public pages.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use exoscope_common::{AppError, CandidateFilter, Classification, FieldErrors, RawCandidateFilter, RawParameters};
use exoscope_db::{Candidate, Dashboard, Dataset, Page, Visibility};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::state::AppState;

pub const PER_PAGE: u32 = 20;

/// GET /api/candidates
pub async fn candidates(
    State(state): State<AppState>,
    Query(raw): Query<RawCandidateFilter>,
) -> Result<Json<Page<Candidate>>, AppError> {
    let filter = CandidateFilter::validate(&raw)?;
    let page = state.candidates.search(&filter, Visibility::Public, raw.page(), PER_PAGE).await?;
    Ok(Json(page))
}

/// GET /api/candidates/{id}
pub async fn candidate(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Candidate>, AppError> {
    let candidate = state.candidates.get(id).await?;
    if !state.datasets.get(candidate.dataset_id).await?.is_active {
        return Err(AppError::NotFound(format!("Candidate {id}")));
    }
    Ok(Json(candidate))
}

/// GET /api/datasets
pub async fn datasets(State(state): State<AppState>) -> Result<Json<Vec<Dataset>>, AppError> {
    Ok(Json(state.datasets.list(true).await?))
}

/// GET /api/dashboard
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(state.dashboard.compute(Visibility::Public).await?))
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub id: i64,
    pub name: String,
    pub prediction: Classification,
    pub confidence: f64,
    pub details: Option<Value>,
}

/// POST /api/predict
///
/// Same validation as the form. Answers 201 with the stored record, 400 with
/// per-field errors (an unreadable body is reported under `body`), or 503
/// when the predictor cannot be reached.
#[instrument(skip_all)]
pub async fn predict(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<PredictResponse>), AppError> {
    let Json(body) = body.map_err(unreadable_body)?;
    let raw = RawParameters::from_json(&body)?;
    let record = state.prediction.submit_raw(&raw, None).await?;
    info!(id = record.id, prediction = record.prediction.as_str(), "API prediction stored");
    Ok((
        StatusCode::CREATED,
        Json(PredictResponse {
            id: record.id,
            name: record.name,
            prediction: record.prediction,
            confidence: record.confidence,
            details: record.details,
        }),
    ))
}

fn unreadable_body(rejection: JsonRejection) -> AppError {
    let mut fields = FieldErrors::new();
    fields.add("body", rejection.body_text());
    AppError::Validation(fields)
}
