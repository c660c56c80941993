//! Prediction form and result pages.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::SignedCookieJar;
use exoscope_common::{AppError, FieldErrors, RawParameters};
use minijinja::context;
use serde::Deserialize;
use tracing::info;

use crate::error::PageResult;
use crate::handlers::parameter_fields;
use crate::render::render;
use crate::session;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PrefillQuery {
    /// Candidate whose parameters prefill the form.
    pub candidate: Option<i64>,
}

fn form_page(
    raw: &RawParameters,
    errors: &FieldErrors,
    notice: Option<&str>,
) -> Result<axum::response::Html<String>, AppError> {
    render(
        "predict.html",
        context! {
            active => "predict",
            name => raw.name.clone().unwrap_or_default(),
            name_error => errors.get("name"),
            fields => parameter_fields(raw, errors),
            notice,
        },
    )
}

/// GET /predict
pub async fn predict_form(
    State(state): State<AppState>,
    Query(prefill): Query<PrefillQuery>,
) -> PageResult<Response> {
    let raw = match prefill.candidate {
        Some(id) => {
            let candidate = state.candidates.get(id).await?;
            RawParameters { name: Some(candidate.name.clone()), ..RawParameters::from_set(&candidate.params) }
        }
        None => RawParameters::default(),
    };
    Ok(form_page(&raw, &FieldErrors::new(), None)?.into_response())
}

/// POST /predict
///
/// Success redirects to the stored result. Invalid input and an unavailable
/// predictor both re-render the form with the submitted values.
pub async fn predict_submit(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(raw): Form<RawParameters>,
) -> PageResult<Response> {
    let (jar, session) = session::current(&state, jar).await?;

    match state.prediction.submit_raw(&raw, Some(session.id)).await {
        Ok(record) => {
            info!(id = record.id, session_id = session.id, "Prediction submitted");
            Ok((jar, Redirect::to(&format!("/predict/result/{}", record.id))).into_response())
        }
        Err(AppError::Validation(errors)) => {
            let html = form_page(&raw, &errors, None)?;
            Ok((StatusCode::UNPROCESSABLE_ENTITY, jar, html).into_response())
        }
        Err(err @ AppError::PredictionUnavailable(_)) => {
            let html = form_page(&raw, &FieldErrors::new(), Some(&err.user_message()))?;
            Ok((StatusCode::SERVICE_UNAVAILABLE, jar, html).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

/// GET /predict/result/{id}
pub async fn predict_result(State(state): State<AppState>, Path(id): Path<i64>) -> PageResult<Response> {
    let record = state.predictions.get(id).await?;
    let fields = parameter_fields(&RawParameters::from_set(&record.input_parameters), &FieldErrors::new());
    let request_body = serde_json::to_string_pretty(&record.request_body)?;
    let api_response = serde_json::to_string_pretty(&record.api_response)?;

    let html = render(
        "predict_result.html",
        context! { active => "predict", record, fields, request_body, api_response },
    )?;
    Ok(html.into_response())
}
