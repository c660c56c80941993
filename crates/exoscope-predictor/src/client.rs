//! HTTP client for the external predictor.

use std::time::Duration;

use async_trait::async_trait;
use exoscope_common::config::PredictorConfig;
use exoscope_common::{ContractVersion, ParameterSet};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::contract::{self, PredictionContract, Verdict};
use crate::error::{PredictorError, Result};

/// Longest slice of an error body kept for logs.
const MAX_ERROR_BODY: usize = 512;

/// Everything observed during one successful round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub endpoint: String,
    pub contract: ContractVersion,
    /// Exact body that was sent.
    pub request_body: Value,
    /// Body that came back, as parsed JSON.
    pub response_body: Value,
    pub verdict: Verdict,
}

/// Anything that can classify a parameter set.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Single attempt, no retries.
    async fn predict(&self, params: &ParameterSet) -> Result<Prediction>;

    fn endpoint(&self) -> &str;
}

/// Predictor reached over HTTP with a bounded timeout.
pub struct HttpPredictor {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    contract: Box<dyn PredictionContract>,
}

impl HttpPredictor {
    pub fn new(config: &PredictorConfig) -> Result<Self> {
        Self::with_timeout(&config.endpoint, config.contract, Duration::from_secs(config.timeout_secs))
    }

    pub fn with_timeout(endpoint: &str, contract: ContractVersion, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("exoscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PredictorError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            timeout,
            contract: contract::for_version(contract),
        })
    }

    fn classify(&self, err: reqwest::Error) -> PredictorError {
        if err.is_timeout() {
            PredictorError::Timeout(self.timeout)
        } else if err.is_connect() {
            PredictorError::Connect(err.to_string())
        } else {
            PredictorError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    #[instrument(skip(self, params), fields(endpoint = %self.endpoint, contract = self.contract.version().as_str()))]
    async fn predict(&self, params: &ParameterSet) -> Result<Prediction> {
        let request_body = self.contract.encode(params);

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            let body: String = String::from_utf8_lossy(&bytes).chars().take(MAX_ERROR_BODY).collect();
            warn!(status = status.as_u16(), "Predictor returned an error status");
            return Err(PredictorError::Status { status: status.as_u16(), body });
        }

        let response_body: Value =
            serde_json::from_slice(&bytes).map_err(|e| PredictorError::InvalidJson(e.to_string()))?;
        let verdict = self.contract.decode(&response_body)?;
        debug!(label = %verdict.label, confidence = verdict.confidence, "Predictor answered");

        Ok(Prediction {
            endpoint: self.endpoint.clone(),
            contract: self.contract.version(),
            request_body,
            response_body,
            verdict,
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{params, FakePredictorServer};
    use exoscope_common::Classification;
    use serde_json::json;

    #[tokio::test]
    async fn test_successful_round_trip() {
        let server = FakePredictorServer::answering(json!({"label": "confirmed", "confidence": 0.92})).await;
        let predictor = HttpPredictor::with_timeout(&server.url(), ContractVersion::V1, Duration::from_secs(2)).unwrap();

        let prediction = predictor.predict(&params()).await.unwrap();
        assert_eq!(prediction.verdict.label, Classification::Confirmed);
        assert_eq!(prediction.verdict.confidence, 0.92);
        assert_eq!(prediction.response_body, json!({"label": "confirmed", "confidence": 0.92}));
        assert_eq!(server.last_request().await, Some(prediction.request_body.clone()));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = FakePredictorServer::hanging(Duration::from_secs(5)).await;
        let predictor =
            HttpPredictor::with_timeout(&server.url(), ContractVersion::V1, Duration::from_millis(200)).unwrap();
        let err = predictor.predict(&params()).await.unwrap_err();
        assert!(matches!(err, PredictorError::Timeout(d) if d == Duration::from_millis(200)), "got {err:?}");
        assert_eq!(err.to_string(), "predictor did not answer within 200ms");
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = FakePredictorServer::failing(500).await;
        let predictor = HttpPredictor::with_timeout(&server.url(), ContractVersion::V1, Duration::from_secs(2)).unwrap();
        let err = predictor.predict(&params()).await.unwrap_err();
        assert!(matches!(err, PredictorError::Status { status: 500, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let predictor = HttpPredictor::with_timeout(
            &format!("http://{addr}/predict"),
            ContractVersion::V1,
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(predictor.predict(&params()).await.is_err());
    }

    #[tokio::test]
    async fn test_non_json_body() {
        let server = FakePredictorServer::raw("<html>oops</html>").await;
        let predictor = HttpPredictor::with_timeout(&server.url(), ContractVersion::V1, Duration::from_secs(2)).unwrap();
        let err = predictor.predict(&params()).await.unwrap_err();
        assert!(matches!(err, PredictorError::InvalidJson(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_koi_contract_over_http() {
        let server = FakePredictorServer::answering(json!({"label": 0, "probability": 0.1})).await;
        let predictor = HttpPredictor::with_timeout(&server.url(), ContractVersion::Koi, Duration::from_secs(2)).unwrap();
        let prediction = predictor.predict(&params()).await.unwrap();
        assert_eq!(prediction.verdict.label, Classification::FalsePositive);
        let sent = server.last_request().await.unwrap();
        assert!(sent.get("koi_period").is_some());
    }
}
