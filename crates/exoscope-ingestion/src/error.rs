//! Import error types.

use exoscope_common::{AppError, FieldErrors};
use exoscope_db::DbError;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

/// Failure that rejects a whole upload.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported file type {0:?}: expected .csv, .xlsx, .xls or .jsonl")]
    UnsupportedFormat(String),

    #[error("file is {size} bytes, the limit is {max}")]
    TooLarge { size: usize, max: usize },

    #[error("file contains no data rows")]
    Empty,

    #[error("cannot read file: {0}")]
    Unreadable(String),

    #[error("unknown import field {0:?} in alias configuration")]
    UnknownAliasField(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Db(e) => e.into(),
            ImportError::UnknownAliasField(_) => AppError::Config(err.to_string()),
            other => {
                let mut fields = FieldErrors::new();
                fields.add("file", other.to_string());
                AppError::Validation(fields)
            }
        }
    }
}

/// Why one data row was rejected. Rows are numbered from 1, header excluded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRowError {
    pub row: usize,
    pub errors: FieldErrors,
}

impl ImportRowError {
    pub fn new(row: usize, errors: FieldErrors) -> Self {
        Self { row, errors }
    }

    /// Row that could not be decoded at all.
    pub fn unreadable(row: usize, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add("row", message);
        Self { row, errors }
    }
}

impl std::fmt::Display for ImportRowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: {}", self.row, self.errors)
    }
}

impl std::error::Error for ImportRowError {}
