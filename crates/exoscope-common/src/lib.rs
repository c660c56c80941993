//! exoscope-common — Shared types, errors, configuration and input validation
//! used across all Exoscope crates.

pub mod config;
pub mod entities;
pub mod error;
pub mod filters;
pub mod params;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError, ContractVersion};
pub use entities::{Classification, Mission};
pub use error::{AppError, FieldErrors, Result};
pub use filters::{CandidateFilter, RawCandidateFilter};
pub use params::{ParameterField, ParameterSet, RawParameters, Submission};
