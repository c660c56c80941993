//! HTTP handlers for all web routes.

pub mod admin;
pub mod analytics;
pub mod api;
pub mod candidates;
pub mod datasets;
pub mod health;
pub mod home;
pub mod predict;
pub mod predictions;
pub mod upload;

use exoscope_common::{Classification, FieldErrors, Mission, ParameterField, RawParameters};
use exoscope_db::Page;
use serde::Serialize;

// ── View helpers ──────────────────────────────────────────────────────────────

/// Option of a `<select>`.
#[derive(Debug, Serialize)]
pub(crate) struct Choice {
    pub value: String,
    pub label: String,
}

pub(crate) fn classification_choices() -> Vec<Choice> {
    Classification::ALL
        .iter()
        .map(|c| Choice { value: c.as_str().to_string(), label: c.display_name().to_string() })
        .collect()
}

pub(crate) fn mission_choices() -> Vec<Choice> {
    Mission::ALL
        .iter()
        .map(|m| Choice { value: m.as_str().to_string(), label: m.as_str().to_string() })
        .collect()
}

/// One numeric input of the parameter form.
#[derive(Debug, Serialize)]
pub(crate) struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    pub value: String,
    pub error: Option<String>,
}

pub(crate) fn parameter_fields(raw: &RawParameters, errors: &FieldErrors) -> Vec<FormField> {
    ParameterField::ALL
        .iter()
        .map(|f| FormField {
            name: f.as_str(),
            label: f.label(),
            value: raw.get(*f).unwrap_or_default().to_string(),
            error: errors.get(f.as_str()).map(str::to_string),
        })
        .collect()
}

/// Previous/next links of a paginated listing.
#[derive(Debug, Serialize)]
pub(crate) struct Pager {
    pub page: u32,
    pub total_pages: u32,
    pub total: u64,
    pub previous: Option<String>,
    pub next: Option<String>,
}

impl Pager {
    /// `query` is the already encoded filter, without `page`.
    pub(crate) fn new<T>(page: &Page<T>, path: &str, query: &str) -> Self {
        let link = |n: u32| {
            if query.is_empty() {
                format!("{path}?page={n}")
            } else {
                format!("{path}?{query}&page={n}")
            }
        };
        Self {
            page: page.page,
            total_pages: page.total_pages(),
            total: page.total,
            previous: page.has_previous().then(|| link(page.page - 1)),
            next: page.has_next().then(|| link(page.page + 1)),
        }
    }
}

/// URL-encode the non-empty pairs.
pub(crate) fn query_string<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> String {
    let mut out = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            out.append_pair(key, v);
        }
    }
    out.finish()
}
