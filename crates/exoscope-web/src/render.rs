//! HTML rendering.
//!
//! Templates are compiled into the binary and auto-escaped by file
//! extension.

use std::sync::LazyLock;

use axum::response::Html;
use exoscope_common::AppError;
use minijinja::{Environment, Value};
use tracing::error;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("macros.html", include_str!("../templates/macros.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("datasets.html", include_str!("../templates/datasets.html")),
    ("dataset_detail.html", include_str!("../templates/dataset_detail.html")),
    ("candidates.html", include_str!("../templates/candidates.html")),
    ("candidate_detail.html", include_str!("../templates/candidate_detail.html")),
    ("predict.html", include_str!("../templates/predict.html")),
    ("predict_result.html", include_str!("../templates/predict_result.html")),
    ("predictions.html", include_str!("../templates/predictions.html")),
    ("analytics.html", include_str!("../templates/analytics.html")),
    ("upload.html", include_str!("../templates/upload.html")),
    ("admin/index.html", include_str!("../templates/admin/index.html")),
    ("admin/login.html", include_str!("../templates/admin/login.html")),
    ("admin/datasets.html", include_str!("../templates/admin/datasets.html")),
    ("admin/dataset_form.html", include_str!("../templates/admin/dataset_form.html")),
    ("admin/candidates.html", include_str!("../templates/admin/candidates.html")),
    ("admin/candidate_form.html", include_str!("../templates/admin/candidate_form.html")),
    ("error.html", include_str!("../templates/error.html")),
];

static ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    for (name, source) in TEMPLATES {
        if let Err(e) = env.add_template(name, source) {
            error!(template = name, error = %e, "Template does not compile");
        }
    }
    env.add_filter("percent", percent);
    env
});

/// `0.923` → `"92.3%"`.
fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Render template `name` with `ctx`.
pub fn render(name: &str, ctx: Value) -> Result<Html<String>, AppError> {
    let template = ENV.get_template(name).map_err(template_error)?;
    template.render(ctx).map(Html).map_err(template_error)
}

fn template_error(err: minijinja::Error) -> AppError {
    AppError::Other(anyhow::Error::new(err).context("template rendering failed"))
}
