//! exoscope-predictor — Client for the external classification service.
//!
//! The predictor is an out-of-process HTTP API. This crate serializes a
//! validated parameter set according to the configured wire contract, makes
//! exactly one bounded-time call, and stores the round-trip only after a
//! well-formed verdict came back.

pub mod client;
pub mod contract;
pub mod error;
pub mod service;

#[cfg(test)]
mod testing;

pub use client::{HttpPredictor, Prediction, Predictor};
pub use contract::{KoiContract, PredictionContract, V1Contract, Verdict};
pub use error::{PredictorError, Result};
pub use service::PredictionService;
