//! Spreadsheet upload.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use exoscope_common::{AppError, FieldErrors, Mission};
use exoscope_db::{Dataset, NewDataset};
use exoscope_ingestion::ImportError;
use minijinja::context;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::PageResult;
use crate::handlers::mission_choices;
use crate::render::render;
use crate::session::AdminAccess;
use crate::state::AppState;

/// Text fields of the upload form, echoed back on errors.
#[derive(Debug, Default, Serialize)]
pub struct UploadFields {
    pub dataset: String,
    pub name: String,
    pub mission: String,
    pub description: String,
    pub source_url: String,
    pub limit: String,
}

#[derive(Debug, Default)]
struct Upload {
    fields: UploadFields,
    file_name: Option<String>,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, FieldErrors> {
    let unreadable = |e: axum::extract::multipart::MultipartError| {
        let mut errors = FieldErrors::new();
        errors.add("file", format!("the upload could not be read: {}", e.body_text()));
        errors
    };

    let mut upload = Upload::default();
    while let Some(field) = multipart.next_field().await.map_err(unreadable)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            upload.file_name = field.file_name().map(str::to_string).filter(|n| !n.is_empty());
            upload.bytes = field.bytes().await.map_err(unreadable)?.to_vec();
            continue;
        }
        let text = field.text().await.map_err(unreadable)?;
        let slot = match name.as_str() {
            "dataset" => &mut upload.fields.dataset,
            "name" => &mut upload.fields.name,
            "mission" => &mut upload.fields.mission,
            "description" => &mut upload.fields.description,
            "source_url" => &mut upload.fields.source_url,
            "limit" => &mut upload.fields.limit,
            _ => continue,
        };
        *slot = text.trim().to_string();
    }
    Ok(upload)
}

fn form_page(datasets: &[Dataset], fields: &UploadFields, errors: &FieldErrors) -> Result<Html<String>, AppError> {
    render(
        "upload.html",
        context! {
            active => "upload",
            datasets,
            missions => mission_choices(),
            fields,
            errors,
        },
    )
}

/// Import failures that belong on the form rather than an error page.
fn form_errors(err: ImportError) -> Result<FieldErrors, ImportError> {
    match err {
        ImportError::Db(_) | ImportError::UnknownAliasField(_) => Err(err),
        other => {
            let mut errors = FieldErrors::new();
            errors.add("file", other.to_string());
            Ok(errors)
        }
    }
}

fn parse_limit(text: &str, errors: &mut FieldErrors) -> Option<usize> {
    if text.is_empty() {
        return None;
    }
    match text.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            errors.add("limit", "must be a positive whole number");
            None
        }
    }
}

/// Existing dataset chosen on the form, or a new one built from the
/// name/mission fields.
async fn resolve_dataset(state: &AppState, fields: &UploadFields) -> PageResult<Result<Dataset, FieldErrors>> {
    let mut errors = FieldErrors::new();

    if !fields.dataset.is_empty() {
        let found = match fields.dataset.parse::<i64>() {
            Ok(id) => state.datasets.find_by_id(id).await?,
            Err(_) => None,
        };
        return Ok(found.ok_or_else(|| {
            errors.add("dataset", "unknown dataset");
            errors
        }));
    }

    let Some(mission) = Mission::parse(&fields.mission) else {
        errors.add("mission", "choose a mission");
        if fields.name.is_empty() {
            errors.add("name", "choose a dataset or name a new one");
        }
        return Ok(Err(errors));
    };
    let mut new = NewDataset::new(fields.name.clone(), mission).with_description(fields.description.clone());
    if !fields.source_url.is_empty() {
        new = new.with_source_url(fields.source_url.clone());
    }
    let new = match new.normalized() {
        Ok(new) => new,
        Err(errors) => return Ok(Err(errors)),
    };
    Ok(Ok(state.datasets.get_or_create(&new).await?))
}

/// GET /upload
pub async fn upload_form(_admin: AdminAccess, State(state): State<AppState>) -> PageResult<Html<String>> {
    let datasets = state.datasets.list(false).await?;
    Ok(form_page(&datasets, &UploadFields::default(), &FieldErrors::new())?)
}

/// POST /upload
#[instrument(skip_all)]
pub async fn upload_submit(
    _admin: AdminAccess,
    State(state): State<AppState>,
    multipart: Multipart,
) -> PageResult<Response> {
    let datasets = state.datasets.list(false).await?;
    let rejected = |fields: &UploadFields, errors: &FieldErrors| -> PageResult<Response> {
        let html = form_page(&datasets, fields, errors)?;
        Ok((StatusCode::BAD_REQUEST, html).into_response())
    };

    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(errors) => return rejected(&UploadFields::default(), &errors),
    };

    let mut errors = FieldErrors::new();
    let limit = parse_limit(&upload.fields.limit, &mut errors);
    let Some(file_name) = upload.file_name.as_deref() else {
        errors.add("file", "choose a file to upload");
        return rejected(&upload.fields, &errors);
    };
    if !errors.is_empty() {
        return rejected(&upload.fields, &errors);
    }

    // Decode before touching the store so a bad file creates no dataset.
    let rows = match state.loader.decode(file_name, &upload.bytes) {
        Ok(rows) => rows,
        Err(err) => return rejected(&upload.fields, &form_errors(err)?),
    };
    let dataset = match resolve_dataset(&state, &upload.fields).await? {
        Ok(dataset) => dataset,
        Err(errors) => return rejected(&upload.fields, &errors),
    };

    let report = state.loader.import_rows(&dataset, rows, limit).await?;
    info!(dataset = %dataset.name, imported = report.imported, rejected = report.rejected(), "Upload imported");

    let html = render(
        "upload.html",
        context! {
            active => "upload",
            report,
            dataset,
        },
    )?;
    Ok(html.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        let mut errors = FieldErrors::new();
        assert_eq!(parse_limit("", &mut errors), None);
        assert_eq!(parse_limit("25", &mut errors), Some(25));
        assert!(errors.is_empty());
        assert_eq!(parse_limit("0", &mut errors), None);
        assert!(errors.contains("limit"));
    }

    #[test]
    fn test_store_failures_are_not_form_errors() {
        assert!(form_errors(ImportError::Empty).unwrap().contains("file"));
        assert!(form_errors(ImportError::UnknownAliasField("x".into())).is_err());
    }
}
