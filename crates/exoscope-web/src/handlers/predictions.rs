//! Prediction history.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::SignedCookieJar;
use exoscope_common::Classification;
use exoscope_db::PredictionQuery;
use minijinja::context;
use serde::{Deserialize, Serialize};

use crate::error::PageResult;
use crate::handlers::{classification_choices, query_string, Pager};
use crate::render::render;
use crate::session;
use crate::state::AppState;

pub const PER_PAGE: u32 = 20;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryQuery {
    pub label: Option<String>,
    /// Checkbox: only predictions of the current session.
    pub mine: Option<String>,
    pub page: Option<String>,
}

impl HistoryQuery {
    fn only_mine(&self) -> bool {
        matches!(self.mine.as_deref(), Some("on" | "true" | "1"))
    }

    fn page(&self) -> u32 {
        self.page.as_deref().and_then(|p| p.trim().parse().ok()).filter(|p| *p > 0).unwrap_or(1)
    }
}

pub async fn predictions_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(q): Query<HistoryQuery>,
) -> PageResult<Response> {
    let label = q.label.as_deref().and_then(Classification::from_label);
    let session = if q.only_mine() { session::existing(&state, &jar).await? } else { None };

    let page = match (q.only_mine(), &session) {
        // Nothing was submitted from a browser without a session.
        (true, None) => exoscope_db::Page { items: Vec::new(), page: 1, per_page: PER_PAGE, total: 0 },
        _ => {
            let query = PredictionQuery { label, session_id: session.as_ref().map(|s| s.id) };
            state.predictions.list(query, q.page(), PER_PAGE).await?
        }
    };

    let filter = query_string([
        ("label", label.map(|l| l.as_str())),
        ("mine", q.only_mine().then_some("on")),
    ]);
    let pager = Pager::new(&page, "/predictions", &filter);

    let html = render(
        "predictions.html",
        context! {
            active => "predictions",
            predictions => page.items,
            pager,
            label => label.map(|l| l.as_str()),
            mine => q.only_mine(),
            classifications => classification_choices(),
        },
    )?;
    Ok((jar, html).into_response())
}
