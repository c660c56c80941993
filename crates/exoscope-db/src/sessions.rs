//! Analysis session repository.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, instrument};

use crate::database::Database;
use crate::error::{DbError, Result};
use crate::rows::{first, row_to_session, SESSION_COLUMNS};
use crate::schema::AnalysisSession;

#[derive(Clone)]
pub struct SessionRepository {
    db: Arc<Database>,
}

impl SessionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Start a new session with a fresh random key. Expired sessions are
    /// purged first.
    #[instrument(skip(self))]
    pub async fn create(&self, ttl: Duration) -> Result<AnalysisSession> {
        self.purge_expired().await?;
        let key = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let id = {
            let conn = self.db.conn().await;
            let mut rows = conn
                .query(
                    "INSERT INTO analysis_sessions (session_key, created_at, updated_at, expires_at)
                     VALUES (?1, ?2, ?2, ?3) RETURNING id",
                    libsql::params![key.as_str(), now.to_rfc3339(), (now + ttl).to_rfc3339()],
                )
                .await?;
            rows.next().await?.ok_or(DbError::NoResult)?.get::<i64>(0)?
        };
        debug!(id, "Analysis session started");
        self.find_by_id(id).await?.ok_or(DbError::NoResult)
    }

    /// Delete expired sessions. Sessions referenced by a prediction record
    /// are kept with the audit log.
    pub async fn purge_expired(&self) -> Result<u64> {
        let conn = self.db.conn().await;
        let purged = conn
            .execute(
                "DELETE FROM analysis_sessions
                 WHERE julianday(expires_at) < julianday(?1)
                   AND id NOT IN (SELECT session_id FROM prediction_requests WHERE session_id IS NOT NULL)",
                [Utc::now().to_rfc3339()],
            )
            .await?;
        if purged > 0 {
            debug!(purged, "Expired analysis sessions purged");
        }
        Ok(purged)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<AnalysisSession>> {
        let conn = self.db.conn().await;
        let rows = conn
            .query(&format!("SELECT {SESSION_COLUMNS} FROM analysis_sessions s WHERE s.id = ?1"), [id])
            .await?;
        first(rows, row_to_session).await
    }

    /// Look up a session by key. Expired sessions are treated as absent.
    pub async fn find_active(&self, key: &str) -> Result<Option<AnalysisSession>> {
        let session = {
            let conn = self.db.conn().await;
            let rows = conn
                .query(
                    &format!("SELECT {SESSION_COLUMNS} FROM analysis_sessions s WHERE s.session_key = ?1"),
                    [key],
                )
                .await?;
            first(rows, row_to_session).await?
        };
        Ok(session.filter(|s| !s.is_expired(Utc::now())))
    }

    /// Resume the session named by `key`, or start a new one. Resuming pushes
    /// the expiry `ttl` into the future.
    pub async fn resume_or_start(&self, key: Option<&str>, ttl: Duration) -> Result<AnalysisSession> {
        if let Some(key) = key {
            if let Some(session) = self.find_active(key).await? {
                self.touch(session.id, ttl).await?;
                return self.find_by_id(session.id).await?.ok_or(DbError::NoResult);
            }
        }
        self.create(ttl).await
    }

    /// Extend the expiry of a session.
    pub async fn touch(&self, id: i64, ttl: Duration) -> Result<()> {
        let now = Utc::now();
        let conn = self.db.conn().await;
        conn.execute(
            "UPDATE analysis_sessions SET updated_at = ?1, expires_at = ?2 WHERE id = ?3",
            libsql::params![now.to_rfc3339(), (now + ttl).to_rfc3339(), id],
        )
        .await?;
        Ok(())
    }

    /// Remember the candidate filter last applied in this session.
    #[instrument(skip(self, parameters))]
    pub async fn record_filter(
        &self,
        id: i64,
        parameters: &serde_json::Value,
        selected_dataset_id: Option<i64>,
    ) -> Result<()> {
        let conn = self.db.conn().await;
        conn.execute(
            "UPDATE analysis_sessions
             SET analysis_parameters = ?1, selected_dataset_id = ?2, updated_at = ?3
             WHERE id = ?4",
            libsql::params![
                serde_json::to_string(parameters)?,
                selected_dataset_id,
                Utc::now().to_rfc3339(),
                id
            ],
        )
        .await?;
        Ok(())
    }

    /// Count a prediction against the session.
    #[instrument(skip(self))]
    pub async fn record_prediction(&self, id: i64, prediction_id: i64) -> Result<()> {
        let conn = self.db.conn().await;
        conn.execute(
            "UPDATE analysis_sessions
             SET analysis_results = json_set(
                     analysis_results,
                     '$.predictions', COALESCE(json_extract(analysis_results, '$.predictions'), 0) + 1,
                     '$.last_prediction_id', ?1),
                 updated_at = ?2
             WHERE id = ?3",
            libsql::params![prediction_id, Utc::now().to_rfc3339(), id],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::DatasetRepository;
    use crate::schema::NewDataset;
    use exoscope_common::Mission;
    use serde_json::json;

    async fn setup() -> (SessionRepository, DatasetRepository) {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        (SessionRepository::new(db.clone()), DatasetRepository::new(db))
    }

    #[tokio::test]
    async fn test_resume_existing_session() {
        let (sessions, _) = setup().await;
        let first = sessions.resume_or_start(None, Duration::hours(1)).await.unwrap();
        let again = sessions
            .resume_or_start(Some(&first.session_key), Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(first.id, again.id);

        let fresh = sessions.resume_or_start(Some("unknown-key"), Duration::hours(1)).await.unwrap();
        assert_ne!(fresh.id, first.id);
    }

    #[tokio::test]
    async fn test_expired_session_is_absent() {
        let (sessions, _) = setup().await;
        let stale = sessions.create(Duration::seconds(-1)).await.unwrap();
        assert!(sessions.find_active(&stale.session_key).await.unwrap().is_none());

        let replacement = sessions
            .resume_or_start(Some(&stale.session_key), Duration::hours(1))
            .await
            .unwrap();
        assert_ne!(replacement.id, stale.id);
    }

    #[tokio::test]
    async fn test_create_purges_expired_sessions() {
        let (sessions, _) = setup().await;
        let stale = sessions.create(Duration::seconds(-5)).await.unwrap();
        let live = sessions.create(Duration::hours(1)).await.unwrap();

        assert!(sessions.find_by_id(stale.id).await.unwrap().is_none());
        assert!(sessions.find_by_id(live.id).await.unwrap().is_some());
        assert_eq!(sessions.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_keeps_sessions_with_predictions() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let sessions = SessionRepository::new(db.clone());
        let predictions = crate::predictions::PredictionRepository::new(db);

        let stale = sessions.create(Duration::seconds(-5)).await.unwrap();
        predictions
            .insert(&crate::predictions::tests::sample(exoscope_common::Classification::Candidate, Some(stale.id)))
            .await
            .unwrap();

        assert_eq!(sessions.purge_expired().await.unwrap(), 0);
        assert!(sessions.find_by_id(stale.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_records_filter_and_predictions() {
        let (sessions, datasets) = setup().await;
        let ds = datasets.insert(&NewDataset::new("Kepler", Mission::Kepler)).await.unwrap();
        let session = sessions.create(Duration::hours(1)).await.unwrap();

        sessions
            .record_filter(session.id, &json!({"classification": "CONFIRMED"}), Some(ds.id))
            .await
            .unwrap();
        sessions.record_prediction(session.id, 7).await.unwrap();
        sessions.record_prediction(session.id, 9).await.unwrap();

        let reloaded = sessions.find_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(reloaded.selected_dataset_id, Some(ds.id));
        assert_eq!(reloaded.analysis_parameters["classification"], "CONFIRMED");
        assert_eq!(reloaded.prediction_count(), 2);
        assert_eq!(reloaded.analysis_results["last_prediction_id"], 9);
    }
}
