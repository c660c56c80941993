//! Exoscope Database Layer
//!
//! This crate provides an embedded relational store on libSQL for datasets,
//! candidates, prediction requests and analysis sessions, plus the dashboard
//! aggregation computed over them.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use exoscope_db::{Database, DatasetRepository, NewDataset};
//! use exoscope_common::Mission;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Arc::new(Database::open("./data/exoscope.db").await?);
//!
//!     let datasets = DatasetRepository::new(db.clone());
//!     datasets.get_or_create(&NewDataset::new("Kepler Confirmed Planets", Mission::Kepler)).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod candidates;
pub mod dashboard;
pub mod database;
pub mod datasets;
pub mod error;
pub mod predictions;
mod rows;
pub mod schema;
pub mod sessions;

pub use candidates::{CandidateRepository, Visibility};
pub use dashboard::{Dashboard, DashboardAggregator, DatasetBreakdown, HistogramBin};
pub use database::{Database, DatabaseStats, IN_MEMORY};
pub use datasets::DatasetRepository;
pub use error::{DbError, Result};
pub use predictions::{PredictionQuery, PredictionRepository};
pub use schema::{
    AnalysisSession, Candidate, Dataset, NewCandidate, NewDataset, NewPrediction, Page, PredictionRecord,
};
pub use sessions::SessionRepository;
