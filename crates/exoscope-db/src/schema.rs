//! Record types for the relational tables.

use chrono::{DateTime, Utc};
use exoscope_common::{Classification, FieldErrors, Mission, ParameterSet};
use serde::{Deserialize, Serialize};

pub const TABLE_DATASETS: &str = "datasets";
pub const TABLE_CANDIDATES: &str = "candidates";
pub const TABLE_PREDICTIONS: &str = "prediction_requests";
pub const TABLE_SESSIONS: &str = "analysis_sessions";

pub const MAX_DATASET_NAME_LEN: usize = 200;

// =============================================================================
// Dataset
// =============================================================================

/// A mission catalogue that candidates are imported from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub mission: Mission,
    pub description: String,
    pub source_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Dataset fields supplied on create or admin edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDataset {
    pub name: String,
    pub mission: Mission,
    pub description: String,
    pub source_url: Option<String>,
    pub is_active: bool,
}

impl NewDataset {
    pub fn new(name: impl Into<String>, mission: Mission) -> Self {
        Self {
            name: name.into(),
            mission,
            description: String::new(),
            source_url: None,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Trim text fields and check them.
    pub fn normalized(mut self) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();

        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            errors.add("name", "this field is required");
        } else if self.name.chars().count() > MAX_DATASET_NAME_LEN {
            errors.add("name", format!("must be at most {MAX_DATASET_NAME_LEN} characters"));
        }

        self.description = self.description.trim().to_string();
        self.source_url = self
            .source_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        if let Some(url) = &self.source_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.add("source_url", "must be an http or https URL");
            }
        }

        errors.into_result(self)
    }
}

// =============================================================================
// Candidate
// =============================================================================

/// One observed transit candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub dataset_id: i64,
    pub name: String,
    pub koi_id: Option<String>,
    pub tess_id: Option<String>,
    #[serde(flatten)]
    pub params: ParameterSet,
    pub classification: Classification,
    pub ml_prediction: Option<Classification>,
    pub ml_confidence: Option<f64>,
    /// Columns of the imported row that did not map to a field.
    pub additional_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Candidate fields supplied on import or admin entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCandidate {
    pub dataset_id: i64,
    pub name: String,
    pub koi_id: Option<String>,
    pub tess_id: Option<String>,
    pub params: ParameterSet,
    pub classification: Classification,
    pub additional_data: serde_json::Value,
}

impl NewCandidate {
    pub fn new(dataset_id: i64, name: impl Into<String>, params: ParameterSet) -> Self {
        Self {
            dataset_id,
            name: name.into(),
            koi_id: None,
            tess_id: None,
            params,
            classification: Classification::Unknown,
            additional_data: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }
}

// =============================================================================
// Prediction request
// =============================================================================

/// Audit record of one predictor round-trip. Never modified once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub session_id: Option<i64>,
    pub name: String,
    pub input_parameters: ParameterSet,
    /// Exact JSON body that was POSTed to the predictor.
    pub request_body: serde_json::Value,
    pub api_endpoint: String,
    pub contract: String,
    /// Parsed JSON body the predictor answered with.
    pub api_response: serde_json::Value,
    pub prediction: Classification,
    pub confidence: f64,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrediction {
    pub session_id: Option<i64>,
    pub name: String,
    pub input_parameters: ParameterSet,
    pub request_body: serde_json::Value,
    pub api_endpoint: String,
    pub contract: String,
    pub api_response: serde_json::Value,
    pub prediction: Classification,
    pub confidence: f64,
    pub details: Option<serde_json::Value>,
}

// =============================================================================
// Analysis session
// =============================================================================

/// Server-side state of one browsing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub id: i64,
    pub session_key: String,
    pub selected_dataset_id: Option<i64>,
    /// Last candidate filter applied.
    pub analysis_parameters: serde_json::Value,
    /// Running counters, e.g. `{"predictions": 3, "last_prediction_id": 17}`.
    pub analysis_results: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AnalysisSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Number of predictions submitted during this session.
    pub fn prediction_count(&self) -> u64 {
        self.analysis_results
            .get("predictions")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }
}

// =============================================================================
// Paging
// =============================================================================

/// One page of a listing. `page` is 1-based and already clamped to the
/// available range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u32 {
        total_pages(self.total, self.per_page)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

/// Number of pages needed for `total` rows; an empty listing still has one.
pub fn total_pages(total: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page.max(1));
    (total.div_ceil(per_page)).max(1) as u32
}
