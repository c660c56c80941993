//! Prediction request repository.
//!
//! Insert-only: a stored request is the audit trail of what was sent to the
//! predictor and what came back, so no update or delete is offered.

use std::sync::Arc;

use exoscope_common::Classification;
use libsql::{Connection, Value};
use tracing::{debug, instrument, warn};

use crate::database::Database;
use crate::error::{DbError, Result};
use crate::rows::{collect, first, now_text, row_to_prediction, scalar_i64, PREDICTION_COLUMNS};
use crate::schema::{total_pages, NewPrediction, Page, PredictionRecord};

/// Optional constraints for the prediction history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictionQuery {
    pub label: Option<Classification>,
    pub session_id: Option<i64>,
}

/// Repository for prediction requests.
#[derive(Clone)]
pub struct PredictionRepository {
    db: Arc<Database>,
}

impl PredictionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store one completed round-trip.
    #[instrument(skip(self, prediction), fields(name = %prediction.name, label = %prediction.prediction))]
    pub async fn insert(&self, prediction: &NewPrediction) -> Result<PredictionRecord> {
        let id = {
            let conn = self.db.conn().await;
            insert_row(&conn, prediction).await?
        };
        debug!(id, "Prediction request stored");
        self.get(id).await
    }

    /// Store a re-analysis of a candidate and copy its verdict onto the
    /// candidate in the same transaction.
    #[instrument(skip(self, prediction), fields(name = %prediction.name, label = %prediction.prediction))]
    pub async fn insert_for_candidate(&self, prediction: &NewPrediction, candidate_id: i64) -> Result<PredictionRecord> {
        let id = {
            let conn = self.db.conn().await;
            let tx = conn.transaction().await?;
            match record_reanalysis(&tx, prediction, candidate_id).await {
                Ok(id) => {
                    tx.commit().await?;
                    id
                }
                Err(e) => {
                    if let Err(rb) = tx.rollback().await {
                        warn!(error = %rb, "Rollback failed");
                    }
                    return Err(e);
                }
            }
        };
        debug!(id, candidate_id, "Re-analysis stored");
        self.get(id).await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<PredictionRecord>> {
        let conn = self.db.conn().await;
        let rows = conn
            .query(&format!("SELECT {PREDICTION_COLUMNS} FROM prediction_requests p WHERE p.id = ?1"), [id])
            .await?;
        first(rows, row_to_prediction).await
    }

    pub async fn get(&self, id: i64) -> Result<PredictionRecord> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Prediction {id}")))
    }

    /// History listing, newest first. Out-of-range pages are clamped.
    pub async fn list(&self, query: PredictionQuery, page: u32, per_page: u32) -> Result<Page<PredictionRecord>> {
        let per_page = per_page.max(1);
        let mut clauses = Vec::new();
        let mut args: Vec<Value> = Vec::new();
        if let Some(label) = query.label {
            clauses.push("p.prediction = ?");
            args.push(Value::Text(label.as_str().to_string()));
        }
        if let Some(session_id) = query.session_id {
            clauses.push("p.session_id = ?");
            args.push(Value::Integer(session_id));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let conn = self.db.conn().await;
        let total = scalar_i64(
            conn.query(
                &format!("SELECT COUNT(*) FROM prediction_requests p{where_sql}"),
                libsql::params_from_iter(args.clone()),
            )
            .await?,
        )
        .await? as u64;

        let page = page.clamp(1, total_pages(total, per_page));
        args.push(Value::Integer(i64::from(per_page)));
        args.push(Value::Integer(i64::from(page - 1) * i64::from(per_page)));
        let rows = conn
            .query(
                &format!(
                    "SELECT {PREDICTION_COLUMNS} FROM prediction_requests p{where_sql}
                     ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?"
                ),
                libsql::params_from_iter(args),
            )
            .await?;
        let items = collect(rows, row_to_prediction).await?;
        Ok(Page { items, page, per_page, total })
    }

    /// The `limit` most recent requests.
    pub async fn recent(&self, limit: u32) -> Result<Vec<PredictionRecord>> {
        let conn = self.db.conn().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {PREDICTION_COLUMNS} FROM prediction_requests p
                     ORDER BY p.created_at DESC, p.id DESC LIMIT ?1"
                ),
                [i64::from(limit)],
            )
            .await?;
        collect(rows, row_to_prediction).await
    }

    /// Requests submitted under a given candidate name, newest first.
    pub async fn by_name(&self, name: &str, limit: u32) -> Result<Vec<PredictionRecord>> {
        let conn = self.db.conn().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {PREDICTION_COLUMNS} FROM prediction_requests p WHERE p.name = ?1
                     ORDER BY p.created_at DESC, p.id DESC LIMIT ?2"
                ),
                libsql::params![name, i64::from(limit)],
            )
            .await?;
        collect(rows, row_to_prediction).await
    }

    pub async fn count(&self) -> Result<u64> {
        let conn = self.db.conn().await;
        let rows = conn.query("SELECT COUNT(*) FROM prediction_requests", ()).await?;
        Ok(scalar_i64(rows).await? as u64)
    }
}

async fn insert_row(conn: &Connection, prediction: &NewPrediction) -> Result<i64> {
    let details = match &prediction.details {
        Some(d) => Some(serde_json::to_string(d)?),
        None => None,
    };
    let mut rows = conn
        .query(
            "INSERT INTO prediction_requests (
                session_id, name, input_parameters, request_body, api_endpoint, contract,
                api_response, prediction, confidence, details, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) RETURNING id",
            libsql::params![
                prediction.session_id,
                prediction.name.as_str(),
                serde_json::to_string(&prediction.input_parameters)?,
                serde_json::to_string(&prediction.request_body)?,
                prediction.api_endpoint.as_str(),
                prediction.contract.as_str(),
                serde_json::to_string(&prediction.api_response)?,
                prediction.prediction.as_str(),
                prediction.confidence,
                details,
                now_text(),
            ],
        )
        .await?;
    Ok(rows.next().await?.ok_or(DbError::NoResult)?.get::<i64>(0)?)
}

async fn record_reanalysis(conn: &Connection, prediction: &NewPrediction, candidate_id: i64) -> Result<i64> {
    let id = insert_row(conn, prediction).await?;
    let changed = conn
        .execute(
            "UPDATE candidates SET ml_prediction = ?1, ml_confidence = ?2, updated_at = ?3 WHERE id = ?4",
            libsql::params![prediction.prediction.as_str(), prediction.confidence, now_text(), candidate_id],
        )
        .await?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("Candidate {candidate_id}")));
    }
    Ok(id)
}
