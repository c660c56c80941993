//! Predictor error types.

use exoscope_common::AppError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PredictorError>;

/// Why a prediction could not be obtained. Every variant surfaces to users
/// as "prediction unavailable".
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("predictor did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("cannot reach predictor: {0}")]
    Connect(String),

    #[error("predictor returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("predictor transport error: {0}")]
    Transport(String),

    #[error("predictor response is not JSON: {0}")]
    InvalidJson(String),

    #[error("malformed predictor response: {0}")]
    Malformed(String),

    #[error("cannot build HTTP client: {0}")]
    Client(String),
}

impl From<PredictorError> for AppError {
    fn from(err: PredictorError) -> Self {
        AppError::PredictionUnavailable(err.to_string())
    }
}
