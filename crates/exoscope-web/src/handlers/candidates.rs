//! Candidate listing and detail pages.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::SignedCookieJar;
use exoscope_common::{AppError, CandidateFilter, FieldErrors, RawCandidateFilter};
use exoscope_db::{Candidate, Page, Visibility};
use minijinja::context;
use tracing::instrument;

use crate::error::PageResult;
use crate::handlers::{classification_choices, query_string, Pager};
use crate::render::render;
use crate::session;
use crate::state::AppState;

pub const PER_PAGE: u32 = 10;
/// Earlier predictions shown next to a candidate.
const RELATED_PREDICTIONS: u32 = 5;

fn filter_query(raw: &RawCandidateFilter) -> String {
    query_string([
        ("search", raw.search.as_deref()),
        ("classification", raw.classification.as_deref()),
        ("dataset", raw.dataset.as_deref()),
        ("min_orbital_period", raw.min_orbital_period.as_deref()),
        ("max_orbital_period", raw.max_orbital_period.as_deref()),
        ("min_planetary_radius", raw.min_planetary_radius.as_deref()),
        ("max_planetary_radius", raw.max_planetary_radius.as_deref()),
    ])
}

#[instrument(skip(state, jar))]
pub async fn candidates_page(
    State(state): State<AppState>,
    mut jar: SignedCookieJar,
    Query(raw): Query<RawCandidateFilter>,
) -> PageResult<Response> {
    let datasets = state.datasets.list(true).await?;

    let (filter, errors) = match CandidateFilter::validate(&raw) {
        Ok(filter) => (Some(filter), FieldErrors::new()),
        Err(errors) => (None, errors),
    };

    // A plain listing only touches a session the browser already has.
    let page = match &filter {
        Some(filter) => {
            let session = if filter.is_empty() {
                session::existing(&state, &jar).await?
            } else {
                let (updated, session) = session::current(&state, jar).await?;
                jar = updated;
                Some(session)
            };
            if let Some(session) = session {
                state
                    .sessions
                    .record_filter(session.id, &serde_json::to_value(filter)?, filter.dataset_id)
                    .await?;
            }
            state.candidates.search(filter, Visibility::Public, raw.page(), PER_PAGE).await?
        }
        None => Page::<Candidate> { items: Vec::new(), page: 1, per_page: PER_PAGE, total: 0 },
    };
    let pager = Pager::new(&page, "/candidates", &filter_query(&raw));
    let status = if errors.is_empty() { StatusCode::OK } else { StatusCode::BAD_REQUEST };

    let html = render(
        "candidates.html",
        context! {
            active => "candidates",
            candidates => page.items,
            pager,
            raw,
            errors,
            datasets,
            classifications => classification_choices(),
        },
    )?;
    Ok((status, jar, html).into_response())
}

pub async fn candidate_detail(State(state): State<AppState>, Path(id): Path<i64>) -> PageResult<Response> {
    let candidate = state.candidates.get(id).await?;
    let dataset = state.datasets.get(candidate.dataset_id).await?;
    if !dataset.is_active {
        return Err(AppError::NotFound(format!("Candidate {id}")).into());
    }
    let predictions = state.predictions.by_name(&candidate.name, RELATED_PREDICTIONS).await?;

    let html = render(
        "candidate_detail.html",
        context! { active => "candidates", candidate, dataset, predictions },
    )?;
    Ok(html.into_response())
}

/// POST /candidates/{id}/reanalyze: send a stored candidate through the
/// predictor again.
pub async fn reanalyze(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(id): Path<i64>,
) -> PageResult<Response> {
    let (jar, session) = session::current(&state, jar).await?;
    let record = state.prediction.reanalyze_candidate(id, Some(session.id)).await?;
    Ok((jar, Redirect::to(&format!("/predict/result/{}", record.id))).into_response())
}
