//! Landing page.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::SignedCookieJar;
use exoscope_common::Classification;
use exoscope_db::Visibility;
use minijinja::context;

use crate::error::PageResult;
use crate::render::render;
use crate::session;
use crate::state::AppState;

pub async fn home(State(state): State<AppState>, jar: SignedCookieJar) -> PageResult<Response> {
    let session = session::existing(&state, &jar).await?;
    let dashboard = state.dashboard.compute(Visibility::Public).await?;
    let datasets = state.datasets.list(true).await?;
    let recent = state.predictions.recent(5).await?;

    let html = render(
        "home.html",
        context! {
            active => "home",
            total_candidates => dashboard.total_candidates,
            confirmed => dashboard.classification_count(Classification::Confirmed),
            candidates => dashboard.classification_count(Classification::Candidate),
            total_predictions => dashboard.predictions.total,
            session_predictions => session.map_or(0, |s| s.prediction_count()),
            datasets,
            recent,
        },
    )?;
    Ok(html.into_response())
}
