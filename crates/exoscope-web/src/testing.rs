//! Fixtures for handler and router tests.

use std::sync::Arc;

use async_trait::async_trait;
use exoscope_common::{AppConfig, Classification, ContractVersion, ParameterSet};
use exoscope_db::Database;
use exoscope_predictor::{Prediction, Predictor, PredictorError, Verdict};
use secrecy::SecretString;
use serde_json::json;

use crate::state::AppState;

/// Predictor answering every request the same way, without a network.
pub struct StubPredictor {
    label: Option<Classification>,
}

impl StubPredictor {
    pub fn confirmed() -> Arc<dyn Predictor> {
        Arc::new(Self { label: Some(Classification::Confirmed) })
    }

    pub fn failing() -> Arc<dyn Predictor> {
        Arc::new(Self { label: None })
    }
}

#[async_trait]
impl Predictor for StubPredictor {
    async fn predict(&self, params: &ParameterSet) -> exoscope_predictor::Result<Prediction> {
        let Some(label) = self.label else {
            return Err(PredictorError::Connect("connection refused".into()));
        };
        Ok(Prediction {
            endpoint: self.endpoint().to_string(),
            contract: ContractVersion::V1,
            request_body: serde_json::to_value(params).unwrap_or_default(),
            response_body: json!({ "prediction": label.as_str(), "confidence": 0.92 }),
            verdict: Verdict { label, confidence: 0.92, details: None },
        })
    }

    fn endpoint(&self) -> &str {
        "http://predictor.test/predict"
    }
}

/// State over an in-memory store, optionally guarded by an admin token.
pub async fn test_state(predictor: Arc<dyn Predictor>, admin_token: Option<&str>) -> AppState {
    let mut config = AppConfig::default();
    config.security.admin_token = admin_token.map(SecretString::from);
    let db = Arc::new(Database::open_in_memory().await.unwrap());
    AppState::new(config, db, predictor).unwrap()
}
