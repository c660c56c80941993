//! Database connection and schema management.
//!
//! One libSQL connection is shared by every repository. SQLite allows a
//! single writer at a time, so access goes through an async mutex; callers
//! must not hold the guard across anything but store work.

use std::path::Path;

use libsql::{Builder, Connection};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{DbError, Result};

const MIGRATION_001: &str = include_str!("../migrations/001_initial.sql");

/// Path that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Main database handle.
pub struct Database {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: Mutex<Connection>,
    path: String,
}

impl Database {
    /// Open or create a database at the specified path and bring the schema
    /// up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        if path_str != IN_MEMORY {
            if let Some(parent) = path.as_ref().parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        // Per-connection in SQLite.
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DbError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let database = Self { db, conn: Mutex::new(conn), path: path_str };
        database.initialize().await?;
        info!(path = %database.path, "Database opened");
        Ok(database)
    }

    /// Fresh, empty in-memory database.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open(IN_MEMORY).await
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Exclusive access to the shared connection.
    pub async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Run the embedded migrations. Every statement is idempotent.
    async fn initialize(&self) -> Result<()> {
        let conn = self.conn().await;
        conn.execute_batch(MIGRATION_001)
            .await
            .map_err(|e| DbError::Migration(format!("001_initial: {e}")))?;
        debug!("Migrations applied");
        Ok(())
    }

    /// Row counts for the health endpoint.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT
                    (SELECT COUNT(*) FROM datasets),
                    (SELECT COUNT(*) FROM candidates),
                    (SELECT COUNT(*) FROM prediction_requests),
                    (SELECT COUNT(*) FROM analysis_sessions)",
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(DbError::NoResult)?;
        Ok(DatabaseStats {
            datasets: row.get::<i64>(0)? as u64,
            candidates: row.get::<i64>(1)? as u64,
            prediction_requests: row.get::<i64>(2)? as u64,
            analysis_sessions: row.get::<i64>(3)? as u64,
        })
    }
}

/// Database statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DatabaseStats {
    pub datasets: u64,
    pub candidates: u64,
    pub prediction_requests: u64,
    pub analysis_sessions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_schema() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.conn().await;
        for table in ["datasets", "candidates", "prediction_requests", "analysis_sessions"] {
            let mut rows = conn
                .query("SELECT name FROM sqlite_master WHERE type='table' AND name=?1", [table])
                .await
                .unwrap();
            assert!(rows.next().await.unwrap().is_some(), "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn test_empty_stats() {
        let db = Database::open_in_memory().await.unwrap();
        let stats = db.stats().await.unwrap();
        assert_eq!(stats.candidates, 0);
        assert_eq!(stats.datasets, 0);
    }

    #[tokio::test]
    async fn test_reopen_file_is_idempotent() {
        let dir = std::env::temp_dir().join(format!("exoscope-db-{}", uuid::Uuid::new_v4()));
        let path = dir.join("store.db");
        {
            let db = Database::open(&path).await.unwrap();
            assert_eq!(db.path(), path.to_string_lossy());
        }
        let db = Database::open(&path).await.unwrap();
        assert_eq!(db.stats().await.unwrap().datasets, 0);
        let _ = std::fs::remove_dir_all(dir);
    }
}
