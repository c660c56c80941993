//! Prediction proxy: validate, call the predictor once, persist the
//! round-trip.
//!
//! Nothing is written unless the predictor answered with a well-formed
//! verdict, so a failed call leaves the store untouched.

use std::sync::Arc;

use exoscope_common::{AppError, ParameterSet, RawParameters, Submission};
use exoscope_db::{CandidateRepository, NewPrediction, PredictionRecord, PredictionRepository, SessionRepository};
use tracing::{info, instrument, warn};

use crate::client::{Prediction, Predictor};

#[derive(Clone)]
pub struct PredictionService {
    predictor: Arc<dyn Predictor>,
    predictions: PredictionRepository,
    sessions: SessionRepository,
    candidates: CandidateRepository,
}

impl PredictionService {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        predictions: PredictionRepository,
        sessions: SessionRepository,
        candidates: CandidateRepository,
    ) -> Self {
        Self { predictor, predictions, sessions, candidates }
    }

    pub fn endpoint(&self) -> &str {
        self.predictor.endpoint()
    }

    /// Validate raw form or JSON input, then [`submit`](Self::submit) it.
    pub async fn submit_raw(
        &self,
        raw: &RawParameters,
        session_id: Option<i64>,
    ) -> Result<PredictionRecord, AppError> {
        let submission = Submission::validate(raw)?;
        self.submit(&submission, session_id).await
    }

    /// Classify one validated submission and store exactly one
    /// [`PredictionRecord`] for it.
    #[instrument(skip(self, submission), fields(name = %submission.name))]
    pub async fn submit(
        &self,
        submission: &Submission,
        session_id: Option<i64>,
    ) -> Result<PredictionRecord, AppError> {
        let prediction = self.call(&submission.params).await?;
        let record = self
            .predictions
            .insert(&to_record(&submission.name, &submission.params, session_id, prediction))
            .await?;
        info!(id = record.id, label = %record.prediction, confidence = record.confidence, "Prediction stored");
        self.count_in_session(session_id, record.id).await;
        Ok(record)
    }

    /// Re-run a stored candidate through the predictor. The audit record and
    /// the candidate's copy of the verdict are stored together or not at all.
    #[instrument(skip(self))]
    pub async fn reanalyze_candidate(
        &self,
        candidate_id: i64,
        session_id: Option<i64>,
    ) -> Result<PredictionRecord, AppError> {
        let candidate = self.candidates.get(candidate_id).await?;
        let prediction = self.call(&candidate.params).await?;
        let record = self
            .predictions
            .insert_for_candidate(&to_record(&candidate.name, &candidate.params, session_id, prediction), candidate_id)
            .await?;
        info!(id = record.id, candidate_id, label = %record.prediction, "Candidate re-analysed");
        self.count_in_session(session_id, record.id).await;
        Ok(record)
    }

    async fn count_in_session(&self, session_id: Option<i64>, prediction_id: i64) {
        let Some(session_id) = session_id else { return };
        // The prediction itself is already stored; a lost counter only
        // affects the session summary.
        if let Err(e) = self.sessions.record_prediction(session_id, prediction_id).await {
            warn!(session_id, error = %e, "Cannot update session counters");
        }
    }

    async fn call(&self, params: &ParameterSet) -> Result<Prediction, AppError> {
        self.predictor.predict(params).await.map_err(|e| {
            warn!(endpoint = self.predictor.endpoint(), error = %e, "Prediction unavailable");
            AppError::from(e)
        })
    }
}

fn to_record(name: &str, params: &ParameterSet, session_id: Option<i64>, prediction: Prediction) -> NewPrediction {
    NewPrediction {
        session_id,
        name: name.to_string(),
        input_parameters: *params,
        request_body: prediction.request_body,
        api_endpoint: prediction.endpoint,
        contract: prediction.contract.as_str().to_string(),
        api_response: prediction.response_body,
        prediction: prediction.verdict.label,
        confidence: prediction.verdict.confidence,
        details: prediction.verdict.details,
    }
}
