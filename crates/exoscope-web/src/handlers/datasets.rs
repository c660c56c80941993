//! Public dataset pages.

use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse};
use exoscope_common::AppError;
use exoscope_db::{Dataset, DatasetBreakdown, Visibility};
use minijinja::context;
use serde::Serialize;

use crate::error::PageResult;
use crate::render::render;
use crate::state::AppState;

/// Candidates listed on a dataset page.
const DETAIL_CANDIDATES: u32 = 20;

#[derive(Debug, Serialize)]
struct DatasetRow {
    dataset: Dataset,
    stats: Option<DatasetBreakdown>,
}

pub async fn datasets_page(State(state): State<AppState>) -> PageResult<impl IntoResponse> {
    let dashboard = state.dashboard.compute(Visibility::Public).await?;
    let rows: Vec<DatasetRow> = state
        .datasets
        .list(true)
        .await?
        .into_iter()
        .map(|dataset| {
            let stats = dashboard.by_dataset.iter().find(|b| b.id == dataset.id).cloned();
            DatasetRow { dataset, stats }
        })
        .collect();

    Ok(render("datasets.html", context! { active => "datasets", rows })?)
}

pub async fn dataset_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> PageResult<Html<String>> {
    let dataset = state
        .datasets
        .find_by_id(id)
        .await?
        .filter(|d| d.is_active)
        .ok_or_else(|| AppError::NotFound(format!("Dataset {id}")))?;

    let dashboard = state.dashboard.compute(Visibility::Public).await?;
    let stats = dashboard.by_dataset.into_iter().find(|b| b.id == id);
    let candidates = state.candidates.list_by_dataset(id, DETAIL_CANDIDATES).await?;

    Ok(render(
        "dataset_detail.html",
        context! { active => "datasets", dataset, stats, candidates },
    )?)
}
