//! Database error types.

use exoscope_common::AppError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Expected a result row but none was returned")]
    NoResult,
}

impl DbError {
    /// Classify a libSQL failure, turning unique-constraint violations into
    /// [`DbError::Duplicate`].
    pub(crate) fn from_write(err: libsql::Error, what: &str) -> Self {
        if err.to_string().contains("UNIQUE constraint failed") {
            DbError::Duplicate(what.to_string())
        } else {
            DbError::LibSql(err)
        }
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => AppError::NotFound(what),
            DbError::Duplicate(what) => {
                let mut fields = exoscope_common::FieldErrors::new();
                fields.add("name", format!("{what} already exists"));
                AppError::Validation(fields)
            }
            other => AppError::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_to_app_error() {
        assert!(matches!(AppError::from(DbError::NotFound("Dataset 4".into())), AppError::NotFound(_)));
        assert!(matches!(AppError::from(DbError::NoResult), AppError::Persistence(_)));
        match AppError::from(DbError::Duplicate("Dataset \"K2\"".into())) {
            AppError::Validation(fields) => assert!(fields.contains("name")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
