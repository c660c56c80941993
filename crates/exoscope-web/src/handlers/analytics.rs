//! Analytics dashboard, recomputed on every request.

use axum::extract::State;
use axum::response::Html;
use exoscope_db::{HistogramBin, Visibility};
use minijinja::context;
use serde::Serialize;

use crate::error::PageResult;
use crate::render::render;
use crate::state::AppState;

/// Horizontal bar, width relative to the largest bar of its chart.
#[derive(Debug, Serialize, PartialEq)]
struct Bar {
    label: String,
    count: u64,
    width: f64,
}

fn bars(items: impl IntoIterator<Item = (String, u64)>) -> Vec<Bar> {
    let items: Vec<(String, u64)> = items.into_iter().collect();
    let max = items.iter().map(|(_, c)| *c).max().unwrap_or(0).max(1);
    items
        .into_iter()
        .map(|(label, count)| Bar { label, count, width: (count as f64 * 1000.0 / max as f64).round() / 10.0 })
        .collect()
}

fn histogram_bars(bins: &[HistogramBin]) -> Vec<Bar> {
    bars(bins.iter().map(|b| (b.label.clone(), b.count)))
}

pub async fn analytics_page(State(state): State<AppState>) -> PageResult<Html<String>> {
    let dashboard = state.dashboard.compute(Visibility::Public).await?;

    let classification_bars =
        bars(dashboard.by_classification.iter().map(|c| (c.label.to_string(), c.count)));
    let mission_bars = bars(dashboard.by_mission.iter().map(|m| (m.mission.as_str().to_string(), m.candidates)));
    let prediction_bars =
        bars(dashboard.predictions.by_label.iter().map(|c| (c.label.to_string(), c.count)));
    let period_bars = histogram_bars(&dashboard.orbital_period_histogram);
    let radius_bars = histogram_bars(&dashboard.planetary_radius_histogram);

    Ok(render(
        "analytics.html",
        context! {
            active => "analytics",
            dashboard,
            classification_bars,
            mission_bars,
            prediction_bars,
            period_bars,
            radius_bars,
        },
    )?)
}
