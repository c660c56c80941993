//! exoscope-web — Web front end for the exoplanet candidate catalogue.
//! Provides:
//!   - Dataset and candidate browsing with filters
//!   - Prediction form backed by the external predictor
//!   - Prediction history and the analytics dashboard
//!   - Spreadsheet upload and administration pages
//!   - A small JSON API

pub mod error;
pub mod handlers;
pub mod render;
pub mod router;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;
