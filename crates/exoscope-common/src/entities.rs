//! Domain enums shared by the store, the predictor and the web layer.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Verdict attached to a candidate, either curated or returned by the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Confirmed,
    Candidate,
    FalsePositive,
    #[default]
    Unknown,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Confirmed,
        Classification::Candidate,
        Classification::FalsePositive,
        Classification::Unknown,
    ];

    /// Serialize to the string stored in the DB.
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Confirmed     => "CONFIRMED",
            Classification::Candidate     => "CANDIDATE",
            Classification::FalsePositive => "FALSE_POSITIVE",
            Classification::Unknown       => "UNKNOWN",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Classification::Confirmed     => "Confirmed Exoplanet",
            Classification::Candidate     => "Planetary Candidate",
            Classification::FalsePositive => "False Positive",
            Classification::Unknown       => "Unknown",
        }
    }

    /// Parse a label as written by people or remote services.
    ///
    /// Case-insensitive; spaces and dashes are treated as underscores, so
    /// `"false positive"`, `"False-Positive"` and `"FALSE_POSITIVE"` are equal.
    pub fn from_label(label: &str) -> Option<Self> {
        let norm = label.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "CONFIRMED"      => Some(Classification::Confirmed),
            "CANDIDATE"      => Some(Classification::Candidate),
            "FALSE_POSITIVE" => Some(Classification::FalsePositive),
            "UNKNOWN"        => Some(Classification::Unknown),
            _ => None,
        }
    }

    /// Map an archive disposition column (Kepler `koi_disposition`, TESS
    /// `tfopwg_disp`) to a classification. Unrecognised text is `Unknown`.
    pub fn from_disposition(text: &str) -> Self {
        if let Some(c) = Self::from_label(text) {
            return c;
        }
        match text.trim().to_ascii_uppercase().as_str() {
            "CP" | "KP"  => Classification::Confirmed,
            "PC" | "APC" => Classification::Candidate,
            "FP" | "FA"  => Classification::FalsePositive,
            _ => Classification::Unknown,
        }
    }

    /// Parse the DB representation, falling back to `Unknown`.
    pub fn from_db(s: &str) -> Self {
        Self::from_label(s).unwrap_or_default()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Mission
// ---------------------------------------------------------------------------

/// Survey mission a dataset was collected by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Mission {
    #[default]
    Kepler,
    K2,
    #[serde(rename = "TESS")]
    Tess,
    Other,
}

impl Mission {
    pub const ALL: [Mission; 4] = [Mission::Kepler, Mission::K2, Mission::Tess, Mission::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mission::Kepler => "Kepler",
            Mission::K2     => "K2",
            Mission::Tess   => "TESS",
            Mission::Other  => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KEPLER" => Some(Mission::Kepler),
            "K2"     => Some(Mission::K2),
            "TESS"   => Some(Mission::Tess),
            "OTHER"  => Some(Mission::Other),
            _ => None,
        }
    }

    /// Parse the DB representation, falling back to `Other`.
    pub fn from_db(s: &str) -> Self {
        Self::parse(s).unwrap_or(Mission::Other)
    }
}

impl fmt::Display for Mission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
