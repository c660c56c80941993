//! Candidate repository.
//!
//! Listing supports the same filter the candidate browser exposes; bulk
//! inserts run in a single transaction so a batch lands completely or not
//! at all.

use std::sync::Arc;

use exoscope_common::CandidateFilter;
use libsql::{Connection, Value};
use tracing::{debug, instrument, warn};

use crate::database::Database;
use crate::error::{DbError, Result};
use crate::rows::{collect, first, now_text, row_to_candidate, scalar_i64, CANDIDATE_COLUMNS};
use crate::schema::{total_pages, Candidate, NewCandidate, Page};

const INSERT_SQL: &str = "INSERT INTO candidates (
        dataset_id, name, koi_id, tess_id,
        orbital_period, transit_duration, planetary_radius, stellar_radius, stellar_mass,
        stellar_effective_temperature, transit_depth, impact_parameter, equilibrium_temperature,
        classification, additional_data, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
    RETURNING id";

/// Which datasets a listing may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Only candidates of active datasets.
    Public,
    /// Everything, for administration.
    All,
}

/// Repository for candidate operations.
#[derive(Clone)]
pub struct CandidateRepository {
    db: Arc<Database>,
}

impl CandidateRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a single candidate.
    #[instrument(skip(self, candidate), fields(name = %candidate.name, dataset_id = candidate.dataset_id))]
    pub async fn insert(&self, candidate: &NewCandidate) -> Result<Candidate> {
        let id = {
            let conn = self.db.conn().await;
            insert_one(&conn, candidate, &now_text()).await?
        };
        self.get(id).await
    }

    /// Insert many candidates atomically. Returns the new row ids in input
    /// order. Any failure rolls the whole batch back.
    #[instrument(skip(self, candidates), fields(count = candidates.len()))]
    pub async fn insert_batch(&self, candidates: &[NewCandidate]) -> Result<Vec<i64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.db.conn().await;
        let tx = conn.transaction().await?;
        let now = now_text();

        let mut ids = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match insert_one(&tx, candidate, &now).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    // A local transaction is not rolled back on drop.
                    if let Err(rb) = tx.rollback().await {
                        warn!(error = %rb, "Rollback failed");
                    }
                    return Err(e);
                }
            }
        }
        tx.commit().await?;

        debug!(inserted = ids.len(), "Candidate batch committed");
        Ok(ids)
    }

    /// Replace the editable fields of a candidate (admin edit).
    #[instrument(skip(self, candidate))]
    pub async fn update(&self, id: i64, candidate: &NewCandidate) -> Result<Candidate> {
        {
            let conn = self.db.conn().await;
            let p = &candidate.params;
            let changed = conn
                .execute(
                    "UPDATE candidates SET
                        dataset_id = ?1, name = ?2, koi_id = ?3, tess_id = ?4,
                        orbital_period = ?5, transit_duration = ?6, planetary_radius = ?7,
                        stellar_radius = ?8, stellar_mass = ?9, stellar_effective_temperature = ?10,
                        transit_depth = ?11, impact_parameter = ?12, equilibrium_temperature = ?13,
                        classification = ?14, additional_data = ?15, updated_at = ?16
                     WHERE id = ?17",
                    libsql::params![
                        candidate.dataset_id,
                        candidate.name.as_str(),
                        candidate.koi_id.clone(),
                        candidate.tess_id.clone(),
                        p.orbital_period,
                        p.transit_duration,
                        p.planetary_radius,
                        p.stellar_radius,
                        p.stellar_mass,
                        p.stellar_effective_temperature,
                        p.transit_depth,
                        p.impact_parameter,
                        p.equilibrium_temperature,
                        candidate.classification.as_str(),
                        serde_json::to_string(&candidate.additional_data)?,
                        now_text(),
                        id,
                    ],
                )
                .await?;
            if changed == 0 {
                return Err(DbError::NotFound(format!("Candidate {id}")));
            }
        }
        self.get(id).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let conn = self.db.conn().await;
        let changed = conn.execute("DELETE FROM candidates WHERE id = ?1", [id]).await?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("Candidate {id}")));
        }
        Ok(())
    }

    /// Find a candidate by ID.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Candidate>> {
        let conn = self.db.conn().await;
        let rows = conn
            .query(&format!("SELECT {CANDIDATE_COLUMNS} FROM candidates c WHERE c.id = ?1"), [id])
            .await?;
        first(rows, row_to_candidate).await
    }

    pub async fn get(&self, id: i64) -> Result<Candidate> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Candidate {id}")))
    }

    /// Filtered listing, newest first. Out-of-range pages are clamped.
    #[instrument(skip(self, filter))]
    pub async fn search(
        &self,
        filter: &CandidateFilter,
        visibility: Visibility,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Candidate>> {
        let per_page = per_page.max(1);
        let (where_sql, args) = build_where(filter, visibility);
        let conn = self.db.conn().await;

        let count_sql = format!(
            "SELECT COUNT(*) FROM candidates c JOIN datasets d ON d.id = c.dataset_id{where_sql}"
        );
        let total = scalar_i64(conn.query(&count_sql, libsql::params_from_iter(args.clone())).await?).await? as u64;

        let page = page.clamp(1, total_pages(total, per_page));
        let offset = i64::from(page - 1) * i64::from(per_page);

        let list_sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates c JOIN datasets d ON d.id = c.dataset_id{where_sql}
             ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?"
        );
        let mut list_args = args;
        list_args.push(Value::Integer(i64::from(per_page)));
        list_args.push(Value::Integer(offset));
        let rows = conn.query(&list_sql, libsql::params_from_iter(list_args)).await?;
        let items = collect(rows, row_to_candidate).await?;

        Ok(Page { items, page, per_page, total })
    }

    /// The most recent candidates of one dataset.
    pub async fn list_by_dataset(&self, dataset_id: i64, limit: u32) -> Result<Vec<Candidate>> {
        let conn = self.db.conn().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {CANDIDATE_COLUMNS} FROM candidates c WHERE c.dataset_id = ?1
                     ORDER BY c.created_at DESC, c.id DESC LIMIT ?2"
                ),
                libsql::params![dataset_id, i64::from(limit)],
            )
            .await?;
        collect(rows, row_to_candidate).await
    }

    /// Count all candidates.
    pub async fn count(&self) -> Result<u64> {
        let conn = self.db.conn().await;
        let rows = conn.query("SELECT COUNT(*) FROM candidates", ()).await?;
        Ok(scalar_i64(rows).await? as u64)
    }

    pub async fn count_by_dataset(&self, dataset_id: i64) -> Result<u64> {
        let conn = self.db.conn().await;
        let rows = conn
            .query("SELECT COUNT(*) FROM candidates WHERE dataset_id = ?1", [dataset_id])
            .await?;
        Ok(scalar_i64(rows).await? as u64)
    }
}

async fn insert_one(conn: &Connection, c: &NewCandidate, now: &str) -> Result<i64> {
    let p = &c.params;
    let mut rows = conn
        .query(
            INSERT_SQL,
            libsql::params![
                c.dataset_id,
                c.name.as_str(),
                c.koi_id.clone(),
                c.tess_id.clone(),
                p.orbital_period,
                p.transit_duration,
                p.planetary_radius,
                p.stellar_radius,
                p.stellar_mass,
                p.stellar_effective_temperature,
                p.transit_depth,
                p.impact_parameter,
                p.equilibrium_temperature,
                c.classification.as_str(),
                serde_json::to_string(&c.additional_data)?,
                now,
            ],
        )
        .await?;
    let row = rows.next().await?.ok_or(DbError::NoResult)?;
    Ok(row.get::<i64>(0)?)
}

/// `LIKE` pattern matching `term` anywhere, with wildcards in `term` escaped.
fn contains_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

fn build_where(filter: &CandidateFilter, visibility: Visibility) -> (String, Vec<Value>) {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();

    if visibility == Visibility::Public {
        clauses.push("d.is_active = 1");
    }
    if let Some(term) = &filter.search {
        clauses.push(
            "(c.name LIKE ? ESCAPE '\\' OR c.koi_id LIKE ? ESCAPE '\\' OR c.tess_id LIKE ? ESCAPE '\\')",
        );
        let pattern = contains_pattern(term);
        for _ in 0..3 {
            args.push(Value::Text(pattern.clone()));
        }
    }
    if let Some(classification) = filter.classification {
        clauses.push("c.classification = ?");
        args.push(Value::Text(classification.as_str().to_string()));
    }
    if let Some(dataset_id) = filter.dataset_id {
        clauses.push("c.dataset_id = ?");
        args.push(Value::Integer(dataset_id));
    }
    let bounds = [
        ("c.orbital_period >= ?", filter.min_orbital_period),
        ("c.orbital_period <= ?", filter.max_orbital_period),
        ("c.planetary_radius >= ?", filter.min_planetary_radius),
        ("c.planetary_radius <= ?", filter.max_planetary_radius),
    ];
    for (clause, bound) in bounds {
        if let Some(v) = bound {
            clauses.push(clause);
            args.push(Value::Real(v));
        }
    }

    if clauses.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), args)
    }
}
