//! Row-to-record conversion.
//!
//! `libsql::Row` is column-indexed, so every SELECT that feeds one of these
//! functions must list its columns in the order of the matching `*_COLUMNS`
//! constant.

use chrono::{DateTime, Utc};
use exoscope_common::{Classification, Mission, ParameterSet};
use libsql::Row;

use crate::error::{DbError, Result};
use crate::schema::{AnalysisSession, Candidate, Dataset, PredictionRecord};

pub(crate) const DATASET_COLUMNS: &str =
    "d.id, d.name, d.mission, d.description, d.source_url, d.is_active, d.created_at";

pub(crate) const CANDIDATE_COLUMNS: &str = "c.id, c.dataset_id, c.name, c.koi_id, c.tess_id, \
     c.orbital_period, c.transit_duration, c.planetary_radius, c.stellar_radius, c.stellar_mass, \
     c.stellar_effective_temperature, c.transit_depth, c.impact_parameter, c.equilibrium_temperature, \
     c.classification, c.ml_prediction, c.ml_confidence, c.additional_data, c.created_at, c.updated_at";

pub(crate) const PREDICTION_COLUMNS: &str = "p.id, p.session_id, p.name, p.input_parameters, \
     p.request_body, p.api_endpoint, p.contract, p.api_response, p.prediction, p.confidence, \
     p.details, p.created_at";

pub(crate) const SESSION_COLUMNS: &str = "s.id, s.session_key, s.selected_dataset_id, \
     s.analysis_parameters, s.analysis_results, s.created_at, s.updated_at, s.expires_at";

pub(crate) fn now_text() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a TEXT timestamp. Accepts RFC 3339 and SQLite's `datetime('now')` form.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DbError::Corrupt(format!("bad timestamp '{s}': {e}")))
}

fn parse_json(s: &str) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(s)?)
}

fn parse_optional_json(s: Option<String>) -> Result<Option<serde_json::Value>> {
    match s {
        Some(s) if !s.is_empty() => Ok(Some(parse_json(&s)?)),
        _ => Ok(None),
    }
}

fn get_opt_string(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get::<Option<String>>(idx)? {
        Some(s) if s.is_empty() => Ok(None),
        other => Ok(other),
    }
}

fn parse_classification(s: &str) -> Result<Classification> {
    Classification::from_label(s).ok_or_else(|| DbError::Corrupt(format!("bad classification '{s}'")))
}

pub(crate) fn row_to_dataset(row: &Row) -> Result<Dataset> {
    Ok(Dataset {
        id: row.get::<i64>(0)?,
        name: row.get::<String>(1)?,
        mission: Mission::from_db(&row.get::<String>(2)?),
        description: row.get::<String>(3)?,
        source_url: get_opt_string(row, 4)?,
        is_active: row.get::<i64>(5)? != 0,
        created_at: parse_datetime(&row.get::<String>(6)?)?,
    })
}

pub(crate) fn row_to_candidate(row: &Row) -> Result<Candidate> {
    let params = ParameterSet {
        orbital_period: row.get::<f64>(5)?,
        transit_duration: row.get::<f64>(6)?,
        planetary_radius: row.get::<f64>(7)?,
        stellar_radius: row.get::<f64>(8)?,
        stellar_mass: row.get::<f64>(9)?,
        stellar_effective_temperature: row.get::<f64>(10)?,
        transit_depth: row.get::<f64>(11)?,
        impact_parameter: row.get::<f64>(12)?,
        equilibrium_temperature: row.get::<f64>(13)?,
    };
    let ml_prediction = match get_opt_string(row, 15)? {
        Some(label) => Some(parse_classification(&label)?),
        None => None,
    };
    Ok(Candidate {
        id: row.get::<i64>(0)?,
        dataset_id: row.get::<i64>(1)?,
        name: row.get::<String>(2)?,
        koi_id: get_opt_string(row, 3)?,
        tess_id: get_opt_string(row, 4)?,
        params,
        classification: parse_classification(&row.get::<String>(14)?)?,
        ml_prediction,
        ml_confidence: row.get::<Option<f64>>(16)?,
        additional_data: parse_json(&row.get::<String>(17)?)?,
        created_at: parse_datetime(&row.get::<String>(18)?)?,
        updated_at: parse_datetime(&row.get::<String>(19)?)?,
    })
}

pub(crate) fn row_to_prediction(row: &Row) -> Result<PredictionRecord> {
    Ok(PredictionRecord {
        id: row.get::<i64>(0)?,
        session_id: row.get::<Option<i64>>(1)?,
        name: row.get::<String>(2)?,
        input_parameters: serde_json::from_str(&row.get::<String>(3)?)?,
        request_body: parse_json(&row.get::<String>(4)?)?,
        api_endpoint: row.get::<String>(5)?,
        contract: row.get::<String>(6)?,
        api_response: parse_json(&row.get::<String>(7)?)?,
        prediction: parse_classification(&row.get::<String>(8)?)?,
        confidence: row.get::<f64>(9)?,
        details: parse_optional_json(row.get::<Option<String>>(10)?)?,
        created_at: parse_datetime(&row.get::<String>(11)?)?,
    })
}

pub(crate) fn row_to_session(row: &Row) -> Result<AnalysisSession> {
    Ok(AnalysisSession {
        id: row.get::<i64>(0)?,
        session_key: row.get::<String>(1)?,
        selected_dataset_id: row.get::<Option<i64>>(2)?,
        analysis_parameters: parse_json(&row.get::<String>(3)?)?,
        analysis_results: parse_json(&row.get::<String>(4)?)?,
        created_at: parse_datetime(&row.get::<String>(5)?)?,
        updated_at: parse_datetime(&row.get::<String>(6)?)?,
        expires_at: parse_datetime(&row.get::<String>(7)?)?,
    })
}

/// Read every row of a result set with `convert`.
pub(crate) async fn collect<T>(
    mut rows: libsql::Rows,
    convert: impl Fn(&Row) -> Result<T>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        out.push(convert(&row)?);
    }
    Ok(out)
}

/// Read the first row, if any.
pub(crate) async fn first<T>(
    mut rows: libsql::Rows,
    convert: impl Fn(&Row) -> Result<T>,
) -> Result<Option<T>> {
    match rows.next().await? {
        Some(row) => Ok(Some(convert(&row)?)),
        None => Ok(None),
    }
}

/// Read a single `COUNT(*)`-style integer.
pub(crate) async fn scalar_i64(mut rows: libsql::Rows) -> Result<i64> {
    let row = rows.next().await?.ok_or(DbError::NoResult)?;
    Ok(row.get::<i64>(0)?)
}
