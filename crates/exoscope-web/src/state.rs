//! Shared application state for the web server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use exoscope_common::AppConfig;
use exoscope_db::{
    CandidateRepository, DashboardAggregator, Database, DatasetRepository, PredictionRepository,
    SessionRepository,
};
use exoscope_ingestion::BulkLoader;
use exoscope_predictor::{HttpPredictor, PredictionService, Predictor};
use secrecy::ExposeSecret;
use tracing::{info, warn};

/// State injected into every handler. Cloning is cheap: everything inside
/// is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    pub datasets: DatasetRepository,
    pub candidates: CandidateRepository,
    pub predictions: PredictionRepository,
    pub sessions: SessionRepository,
    pub dashboard: DashboardAggregator,
    pub prediction: PredictionService,
    pub loader: BulkLoader,
    key: Key,
}

impl AppState {
    /// Assemble the state around an open store and a predictor.
    pub fn new(config: AppConfig, db: Arc<Database>, predictor: Arc<dyn Predictor>) -> anyhow::Result<Self> {
        let datasets = DatasetRepository::new(db.clone());
        let candidates = CandidateRepository::new(db.clone());
        let predictions = PredictionRepository::new(db.clone());
        let sessions = SessionRepository::new(db.clone());
        let prediction =
            PredictionService::new(predictor, predictions.clone(), sessions.clone(), candidates.clone());
        let loader = BulkLoader::from_config(candidates.clone(), &config.import)
            .context("invalid [import] configuration")?;
        let key = signing_key(&config);

        Ok(Self {
            dashboard: DashboardAggregator::new(db.clone()),
            config: Arc::new(config),
            db,
            datasets,
            candidates,
            predictions,
            sessions,
            prediction,
            loader,
            key,
        })
    }

    /// Open the configured store and HTTP predictor.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let db = Database::open(&config.database.path)
            .await
            .with_context(|| format!("cannot open database {}", config.database.path))?;
        info!(path = %config.database.path, "Database ready");

        let predictor = HttpPredictor::new(&config.predictor).context("cannot build predictor client")?;
        info!(
            endpoint = %config.predictor.endpoint,
            contract = config.predictor.contract.as_str(),
            "Predictor configured"
        );
        Self::new(config, Arc::new(db), Arc::new(predictor))
    }

    /// Lifetime of an analysis session after its last request.
    pub fn session_ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.config.server.session_ttl_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or_else(|| chrono::Duration::days(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.server.request_timeout_secs)
    }

    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

fn signing_key(config: &AppConfig) -> Key {
    match &config.security.secret_key {
        Some(secret) => match Key::try_from(secret.expose_secret().as_bytes()) {
            Ok(key) => key,
            Err(_) => {
                warn!("Secret key is too short to sign cookies; using a random key");
                Key::generate()
            }
        },
        None => {
            warn!("No secret key configured; sessions will not survive a restart");
            Key::generate()
        }
    }
}
