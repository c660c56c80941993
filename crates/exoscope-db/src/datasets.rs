//! Dataset repository.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::database::Database;
use crate::error::{DbError, Result};
use crate::rows::{collect, first, now_text, parse_datetime, row_to_dataset, scalar_i64, DATASET_COLUMNS};
use crate::schema::{Dataset, NewDataset};

/// Repository for dataset operations.
#[derive(Clone)]
pub struct DatasetRepository {
    db: Arc<Database>,
}

impl DatasetRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new dataset. Names are unique.
    #[instrument(skip(self, dataset), fields(name = %dataset.name))]
    pub async fn insert(&self, dataset: &NewDataset) -> Result<Dataset> {
        let created_at = now_text();
        let conn = self.db.conn().await;
        // `last_insert_rowid` is only meaningful while this guard is held.
        conn.execute(
            "INSERT INTO datasets (name, mission, description, source_url, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            libsql::params![
                dataset.name.as_str(),
                dataset.mission.as_str(),
                dataset.description.as_str(),
                dataset.source_url.clone(),
                dataset.is_active as i64,
                created_at.as_str(),
            ],
        )
        .await
        .map_err(|e| DbError::from_write(e, &format!("Dataset \"{}\"", dataset.name)))?;
        let id = conn.last_insert_rowid();
        debug!(id, "Dataset created");

        Ok(Dataset {
            id,
            name: dataset.name.clone(),
            mission: dataset.mission,
            description: dataset.description.clone(),
            source_url: dataset.source_url.clone(),
            is_active: dataset.is_active,
            created_at: parse_datetime(&created_at)?,
        })
    }

    /// Replace the editable fields of a dataset.
    #[instrument(skip(self, dataset))]
    pub async fn update(&self, id: i64, dataset: &NewDataset) -> Result<Dataset> {
        {
            let conn = self.db.conn().await;
            let changed = conn
                .execute(
                    "UPDATE datasets SET name = ?1, mission = ?2, description = ?3, source_url = ?4, is_active = ?5
                     WHERE id = ?6",
                    libsql::params![
                        dataset.name.as_str(),
                        dataset.mission.as_str(),
                        dataset.description.as_str(),
                        dataset.source_url.clone(),
                        dataset.is_active as i64,
                        id,
                    ],
                )
                .await
                .map_err(|e| DbError::from_write(e, &format!("Dataset \"{}\"", dataset.name)))?;
            if changed == 0 {
                return Err(DbError::NotFound(format!("Dataset {id}")));
            }
        }
        self.get(id).await
    }

    /// Delete a dataset and, through the cascade, all of its candidates.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let conn = self.db.conn().await;
        let changed = conn.execute("DELETE FROM datasets WHERE id = ?1", [id]).await?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("Dataset {id}")));
        }
        debug!(id, "Dataset deleted");
        Ok(())
    }

    /// Find a dataset by ID.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Dataset>> {
        let conn = self.db.conn().await;
        let rows = conn
            .query(&format!("SELECT {DATASET_COLUMNS} FROM datasets d WHERE d.id = ?1"), [id])
            .await?;
        first(rows, row_to_dataset).await
    }

    /// Like [`find_by_id`](Self::find_by_id) but missing rows are an error.
    pub async fn get(&self, id: i64) -> Result<Dataset> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Dataset {id}")))
    }

    /// Find a dataset by its exact name.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Dataset>> {
        let conn = self.db.conn().await;
        let rows = conn
            .query(&format!("SELECT {DATASET_COLUMNS} FROM datasets d WHERE d.name = ?1"), [name])
            .await?;
        first(rows, row_to_dataset).await
    }

    /// Return the dataset called `dataset.name`, creating it when absent.
    pub async fn get_or_create(&self, dataset: &NewDataset) -> Result<Dataset> {
        if let Some(existing) = self.find_by_name(&dataset.name).await? {
            return Ok(existing);
        }
        match self.insert(dataset).await {
            // Lost a race with a concurrent creator.
            Err(DbError::Duplicate(_)) => self
                .find_by_name(&dataset.name)
                .await?
                .ok_or(DbError::NoResult),
            other => other,
        }
    }

    /// All datasets ordered by name; `active_only` hides deactivated ones.
    pub async fn list(&self, active_only: bool) -> Result<Vec<Dataset>> {
        let conn = self.db.conn().await;
        let sql = if active_only {
            format!("SELECT {DATASET_COLUMNS} FROM datasets d WHERE d.is_active = 1 ORDER BY d.name")
        } else {
            format!("SELECT {DATASET_COLUMNS} FROM datasets d ORDER BY d.name")
        };
        let rows = conn.query(&sql, ()).await?;
        collect(rows, row_to_dataset).await
    }

    /// Count datasets.
    pub async fn count(&self) -> Result<u64> {
        let conn = self.db.conn().await;
        let rows = conn.query("SELECT COUNT(*) FROM datasets", ()).await?;
        Ok(scalar_i64(rows).await? as u64)
    }
}
