//! Candidate listing filters.

use serde::{Deserialize, Serialize};

use crate::entities::Classification;
use crate::error::FieldErrors;
use crate::params::parse_decimal;

/// Query-string form of the candidate filter, as submitted by the browser.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawCandidateFilter {
    pub search: Option<String>,
    pub classification: Option<String>,
    pub dataset: Option<String>,
    pub min_orbital_period: Option<String>,
    pub max_orbital_period: Option<String>,
    pub min_planetary_radius: Option<String>,
    pub max_planetary_radius: Option<String>,
    pub page: Option<String>,
}

/// Validated candidate filter. `None` means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateFilter {
    pub search: Option<String>,
    pub classification: Option<Classification>,
    pub dataset_id: Option<i64>,
    pub min_orbital_period: Option<f64>,
    pub max_orbital_period: Option<f64>,
    pub min_planetary_radius: Option<f64>,
    pub max_planetary_radius: Option<f64>,
}

impl CandidateFilter {
    pub fn is_empty(&self) -> bool {
        *self == CandidateFilter::default()
    }

    pub fn validate(raw: &RawCandidateFilter) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();

        let search = non_empty(&raw.search).map(String::from);

        let classification = match non_empty(&raw.classification) {
            None => None,
            Some(text) => match Classification::from_label(text) {
                Some(c) => Some(c),
                None => {
                    errors.add("classification", "unknown classification");
                    None
                }
            },
        };

        let dataset_id = match non_empty(&raw.dataset) {
            None => None,
            Some(text) => match text.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("dataset", "unknown dataset");
                    None
                }
            },
        };

        let mut bound = |name: &str, value: &Option<String>| -> Option<f64> {
            match value.as_deref().and_then(parse_decimal) {
                None => None,
                Some(Ok(v)) => Some(v),
                Some(Err(msg)) => {
                    errors.add(name, msg);
                    None
                }
            }
        };
        let min_orbital_period = bound("min_orbital_period", &raw.min_orbital_period);
        let max_orbital_period = bound("max_orbital_period", &raw.max_orbital_period);
        let min_planetary_radius = bound("min_planetary_radius", &raw.min_planetary_radius);
        let max_planetary_radius = bound("max_planetary_radius", &raw.max_planetary_radius);

        if let (Some(lo), Some(hi)) = (min_orbital_period, max_orbital_period) {
            if lo > hi {
                errors.add("orbital_period", "minimum orbital period cannot exceed the maximum");
            }
        }
        if let (Some(lo), Some(hi)) = (min_planetary_radius, max_planetary_radius) {
            if lo > hi {
                errors.add("planetary_radius", "minimum planetary radius cannot exceed the maximum");
            }
        }

        errors.into_result(Self {
            search,
            classification,
            dataset_id,
            min_orbital_period,
            max_orbital_period,
            min_planetary_radius,
            max_planetary_radius,
        })
    }
}

impl RawCandidateFilter {
    /// 1-based page number; anything unparsable is page 1.
    pub fn page(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
