//! Administration: login, dataset and candidate management.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::SignedCookieJar;
use exoscope_common::{
    AppError, CandidateFilter, Classification, FieldErrors, Mission, RawParameters, Submission,
};
use exoscope_db::{Candidate, Dataset, NewCandidate, NewDataset, Visibility};
use minijinja::context;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::PageResult;
use crate::handlers::{classification_choices, mission_choices, parameter_fields, query_string, Pager};
use crate::render::render;
use crate::session::{self, AdminAccess};
use crate::state::AppState;

pub const PER_PAGE: u32 = 20;

fn checked(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some("on" | "true" | "1"))
}

fn optional(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

// ── Overview and login ────────────────────────────────────────────────────────

/// GET /admin
pub async fn index(_admin: AdminAccess, State(state): State<AppState>) -> PageResult<Html<String>> {
    let stats = state.db.stats().await?;
    Ok(render(
        "admin/index.html",
        context! {
            active => "admin",
            stats,
            endpoint => state.prediction.endpoint(),
            login_required => state.config.security.admin_token.is_some(),
        },
    )?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub token: String,
}

fn login_page(error: Option<&str>) -> Result<Html<String>, AppError> {
    render("admin/login.html", context! { active => "admin", error })
}

/// GET /admin/login
pub async fn login_form(State(state): State<AppState>) -> PageResult<Response> {
    if state.config.security.admin_token.is_none() {
        return Ok(Redirect::to("/admin").into_response());
    }
    Ok(login_page(None)?.into_response())
}

/// POST /admin/login
pub async fn login_submit(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<LoginForm>,
) -> PageResult<Response> {
    let security = &state.config.security;
    if security.admin_token.is_none() {
        return Ok(Redirect::to("/admin").into_response());
    }
    if !security.admin_token_matches(Some(form.token.trim())) {
        warn!("Rejected admin login");
        let html = login_page(Some("The token is not valid."))?;
        return Ok((StatusCode::FORBIDDEN, html).into_response());
    }
    info!("Admin login");
    Ok((session::grant_admin(jar), Redirect::to("/admin")).into_response())
}

/// POST /admin/logout
pub async fn logout(jar: SignedCookieJar) -> Response {
    (session::revoke_admin(jar), Redirect::to("/")).into_response()
}

// ── Datasets ──────────────────────────────────────────────────────────────────

/// Dataset form as submitted; echoed back when invalid.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetForm {
    pub name: String,
    pub mission: String,
    pub description: String,
    pub source_url: String,
    pub is_active: Option<String>,
}

impl DatasetForm {
    fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            name: dataset.name.clone(),
            mission: dataset.mission.as_str().to_string(),
            description: dataset.description.clone(),
            source_url: dataset.source_url.clone().unwrap_or_default(),
            is_active: dataset.is_active.then(|| "on".to_string()),
        }
    }

    fn validate(&self) -> Result<NewDataset, FieldErrors> {
        let mission = Mission::parse(&self.mission);
        let mut new = NewDataset::new(self.name.clone(), mission.unwrap_or(Mission::Other))
            .with_description(self.description.clone());
        if let Some(url) = optional(&self.source_url) {
            new = new.with_source_url(url);
        }
        new.is_active = checked(&self.is_active);

        let mut errors = match new.normalized() {
            Ok(new) if mission.is_some() => return Ok(new),
            Ok(_) => FieldErrors::new(),
            Err(errors) => errors,
        };
        if mission.is_none() {
            errors.add("mission", "choose a mission");
        }
        Err(errors)
    }
}

fn dataset_form_page(
    dataset_id: Option<i64>,
    form: &DatasetForm,
    errors: &FieldErrors,
) -> Result<Html<String>, AppError> {
    render(
        "admin/dataset_form.html",
        context! {
            active => "admin",
            dataset_id,
            form,
            errors,
            missions => mission_choices(),
        },
    )
}

/// GET /admin/datasets
pub async fn datasets(_admin: AdminAccess, State(state): State<AppState>) -> PageResult<Html<String>> {
    let datasets = state.datasets.list(false).await?;
    let mut rows = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let candidates = state.candidates.count_by_dataset(dataset.id).await?;
        rows.push(context! { dataset, candidates });
    }
    Ok(render("admin/datasets.html", context! { active => "admin", rows })?)
}

/// GET /admin/datasets/new
pub async fn new_dataset(_admin: AdminAccess) -> PageResult<Html<String>> {
    let form = DatasetForm { is_active: Some("on".to_string()), ..DatasetForm::default() };
    Ok(dataset_form_page(None, &form, &FieldErrors::new())?)
}

/// POST /admin/datasets/new
#[instrument(skip_all)]
pub async fn create_dataset(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Form(form): Form<DatasetForm>,
) -> PageResult<Response> {
    let new = match form.validate() {
        Ok(new) => new,
        Err(errors) => {
            let html = dataset_form_page(None, &form, &errors)?;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, html).into_response());
        }
    };
    if state.datasets.find_by_name(&new.name).await?.is_some() {
        let mut errors = FieldErrors::new();
        errors.add("name", "a dataset with this name already exists");
        let html = dataset_form_page(None, &form, &errors)?;
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, html).into_response());
    }
    let dataset = state.datasets.insert(&new).await?;
    info!(id = dataset.id, name = %dataset.name, "Dataset created");
    Ok(Redirect::to("/admin/datasets").into_response())
}

/// GET /admin/datasets/{id}/edit
pub async fn edit_dataset(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> PageResult<Html<String>> {
    let dataset = state.datasets.get(id).await?;
    Ok(dataset_form_page(Some(id), &DatasetForm::from_dataset(&dataset), &FieldErrors::new())?)
}

/// POST /admin/datasets/{id}/edit
#[instrument(skip(state, form))]
pub async fn update_dataset(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<DatasetForm>,
) -> PageResult<Response> {
    let errors = match form.validate() {
        Ok(new) => match state.datasets.find_by_name(&new.name).await? {
            Some(other) if other.id != id => {
                let mut errors = FieldErrors::new();
                errors.add("name", "a dataset with this name already exists");
                errors
            }
            _ => {
                state.datasets.update(id, &new).await?;
                info!(id, "Dataset updated");
                return Ok(Redirect::to("/admin/datasets").into_response());
            }
        },
        Err(errors) => errors,
    };
    state.datasets.get(id).await?;
    let html = dataset_form_page(Some(id), &form, &errors)?;
    Ok((StatusCode::UNPROCESSABLE_ENTITY, html).into_response())
}

/// POST /admin/datasets/{id}/delete
#[instrument(skip(state))]
pub async fn delete_dataset(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> PageResult<Response> {
    state.datasets.delete(id).await?;
    info!(id, "Dataset deleted");
    Ok(Redirect::to("/admin/datasets").into_response())
}

// ── Candidates ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdminListQuery {
    pub search: Option<String>,
    pub dataset: Option<String>,
    pub page: Option<String>,
}

impl AdminListQuery {
    fn page(&self) -> u32 {
        self.page.as_deref().and_then(|p| p.trim().parse().ok()).filter(|p| *p > 0).unwrap_or(1)
    }
}

/// GET /admin/candidates: every candidate, inactive datasets included.
pub async fn candidates(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Query(q): Query<AdminListQuery>,
) -> PageResult<Html<String>> {
    let filter = CandidateFilter {
        search: q.search.as_deref().and_then(optional),
        dataset_id: q.dataset.as_deref().and_then(|d| d.trim().parse().ok()),
        ..CandidateFilter::default()
    };
    let page = state.candidates.search(&filter, Visibility::All, q.page(), PER_PAGE).await?;
    let datasets = state.datasets.list(false).await?;
    let pager = Pager::new(
        &page,
        "/admin/candidates",
        &query_string([("search", q.search.as_deref()), ("dataset", q.dataset.as_deref())]),
    );

    Ok(render(
        "admin/candidates.html",
        context! {
            active => "admin",
            candidates => page.items,
            pager,
            datasets,
            search => q.search.unwrap_or_default(),
            dataset => filter.dataset_id,
        },
    )?)
}

/// Candidate form as submitted. The parameter inputs share their names with
/// the prediction form; `name` is the candidate name.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CandidateForm {
    pub dataset: String,
    pub koi_id: String,
    pub tess_id: String,
    pub classification: String,
    #[serde(flatten)]
    pub params: RawParameters,
}

impl CandidateForm {
    fn from_candidate(candidate: &Candidate) -> Self {
        Self {
            dataset: candidate.dataset_id.to_string(),
            koi_id: candidate.koi_id.clone().unwrap_or_default(),
            tess_id: candidate.tess_id.clone().unwrap_or_default(),
            classification: candidate.classification.as_str().to_string(),
            params: RawParameters {
                name: Some(candidate.name.clone()),
                ..RawParameters::from_set(&candidate.params)
            },
        }
    }

    /// Check the form against the known datasets. `additional_data` is kept
    /// from the stored candidate on edit.
    fn validate(&self, datasets: &[Dataset], additional_data: serde_json::Value) -> Result<NewCandidate, FieldErrors> {
        let mut errors = FieldErrors::new();

        let dataset_id = self
            .dataset
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| datasets.iter().any(|d| d.id == *id));
        if dataset_id.is_none() {
            errors.add("dataset", "choose a dataset");
        }

        let classification = match optional(&self.classification) {
            None => Some(Classification::Unknown),
            Some(text) => Classification::from_label(&text),
        };
        if classification.is_none() {
            errors.add("classification", "unknown classification");
        }

        let submission = match Submission::validate(&self.params) {
            Ok(s) => Some(s),
            Err(param_errors) => {
                for (field, msg) in param_errors.iter() {
                    errors.add(field, msg);
                }
                None
            }
        };

        match (dataset_id, classification, submission) {
            (Some(dataset_id), Some(classification), Some(submission)) if errors.is_empty() => Ok(NewCandidate {
                dataset_id,
                name: submission.name,
                koi_id: optional(&self.koi_id),
                tess_id: optional(&self.tess_id),
                params: submission.params,
                classification,
                additional_data,
            }),
            _ => Err(errors),
        }
    }
}

fn candidate_form_page(
    candidate_id: Option<i64>,
    datasets: &[Dataset],
    form: &CandidateForm,
    errors: &FieldErrors,
) -> Result<Html<String>, AppError> {
    render(
        "admin/candidate_form.html",
        context! {
            active => "admin",
            candidate_id,
            datasets,
            classifications => classification_choices(),
            form,
            name => form.params.name.clone().unwrap_or_default(),
            fields => parameter_fields(&form.params, errors),
            errors,
        },
    )
}

/// GET /admin/candidates/new
pub async fn new_candidate(_admin: AdminAccess, State(state): State<AppState>) -> PageResult<Html<String>> {
    let datasets = state.datasets.list(false).await?;
    let form = CandidateForm { classification: Classification::Unknown.as_str().to_string(), ..Default::default() };
    Ok(candidate_form_page(None, &datasets, &form, &FieldErrors::new())?)
}

/// POST /admin/candidates/new
#[instrument(skip_all)]
pub async fn create_candidate(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Form(form): Form<CandidateForm>,
) -> PageResult<Response> {
    let datasets = state.datasets.list(false).await?;
    match form.validate(&datasets, serde_json::Value::Object(Default::default())) {
        Ok(new) => {
            let candidate = state.candidates.insert(&new).await?;
            info!(id = candidate.id, name = %candidate.name, "Candidate created");
            Ok(Redirect::to("/admin/candidates").into_response())
        }
        Err(errors) => {
            let html = candidate_form_page(None, &datasets, &form, &errors)?;
            Ok((StatusCode::UNPROCESSABLE_ENTITY, html).into_response())
        }
    }
}

/// GET /admin/candidates/{id}/edit
pub async fn edit_candidate(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> PageResult<Html<String>> {
    let candidate = state.candidates.get(id).await?;
    let datasets = state.datasets.list(false).await?;
    Ok(candidate_form_page(Some(id), &datasets, &CandidateForm::from_candidate(&candidate), &FieldErrors::new())?)
}

/// POST /admin/candidates/{id}/edit
#[instrument(skip(state, form))]
pub async fn update_candidate(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<CandidateForm>,
) -> PageResult<Response> {
    let existing = state.candidates.get(id).await?;
    let datasets = state.datasets.list(false).await?;
    match form.validate(&datasets, existing.additional_data) {
        Ok(new) => {
            state.candidates.update(id, &new).await?;
            info!(id, "Candidate updated");
            Ok(Redirect::to("/admin/candidates").into_response())
        }
        Err(errors) => {
            let html = candidate_form_page(Some(id), &datasets, &form, &errors)?;
            Ok((StatusCode::UNPROCESSABLE_ENTITY, html).into_response())
        }
    }
}

/// POST /admin/candidates/{id}/delete
#[instrument(skip(state))]
pub async fn delete_candidate(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> PageResult<Response> {
    state.candidates.delete(id).await?;
    info!(id, "Candidate deleted");
    Ok(Redirect::to("/admin/candidates").into_response())
}
