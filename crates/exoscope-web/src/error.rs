//! Error pages for HTML routes. JSON routes return [`AppError`] directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use exoscope_common::{AppError, FieldErrors};
use exoscope_db::DbError;
use exoscope_ingestion::ImportError;
use minijinja::context;
use tracing::{debug, error};

use crate::render::render;

/// [`AppError`] rendered as an HTML page.
#[derive(Debug)]
pub struct PageError(pub AppError);

pub type PageResult<T = Response> = Result<T, PageError>;

impl From<AppError> for PageError {
    fn from(err: AppError) -> Self {
        PageError(err)
    }
}

impl From<DbError> for PageError {
    fn from(err: DbError) -> Self {
        PageError(err.into())
    }
}

impl From<ImportError> for PageError {
    fn from(err: ImportError) -> Self {
        PageError(err.into())
    }
}

impl From<FieldErrors> for PageError {
    fn from(err: FieldErrors) -> Self {
        PageError(err.into())
    }
}

impl From<serde_json::Error> for PageError {
    fn from(err: serde_json::Error) -> Self {
        PageError(AppError::Other(err.into()))
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = err.status();
        if status.is_server_error() {
            error!(error = %err, "Request failed");
        } else {
            debug!(error = %err, "Request rejected");
        }

        let page = render(
            "error.html",
            context! {
                status => status.as_u16(),
                reason => status.canonical_reason().unwrap_or("Error"),
                message => err.user_message(),
                forbidden => status == StatusCode::FORBIDDEN,
            },
        );
        match page {
            Ok(html) => (status, html).into_response(),
            Err(_) => (status, err.user_message()).into_response(),
        }
    }
}
