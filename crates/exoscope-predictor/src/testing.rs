//! In-process stand-in for the external predictor, for tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use exoscope_common::ParameterSet;
use serde_json::Value;
use tokio::sync::Mutex;

pub(crate) fn params() -> ParameterSet {
    ParameterSet {
        orbital_period: 112.305,
        transit_duration: 5.2,
        planetary_radius: 1.34,
        stellar_radius: 0.6,
        stellar_mass: 0.61,
        stellar_effective_temperature: 4402.0,
        transit_depth: 0.0001,
        impact_parameter: 0.3,
        equilibrium_temperature: 233.0,
    }
}

#[derive(Clone)]
enum Behaviour {
    Answer(Value),
    Hang(Duration),
    Fail(u16),
    Raw(&'static str),
}

#[derive(Clone)]
struct FakeState {
    behaviour: Behaviour,
    last_request: Arc<Mutex<Option<Value>>>,
}

pub(crate) struct FakePredictorServer {
    addr: SocketAddr,
    last_request: Arc<Mutex<Option<Value>>>,
}

impl FakePredictorServer {
    pub(crate) async fn answering(body: Value) -> Self {
        Self::start(Behaviour::Answer(body)).await
    }

    pub(crate) async fn hanging(delay: Duration) -> Self {
        Self::start(Behaviour::Hang(delay)).await
    }

    pub(crate) async fn failing(status: u16) -> Self {
        Self::start(Behaviour::Fail(status)).await
    }

    pub(crate) async fn raw(body: &'static str) -> Self {
        Self::start(Behaviour::Raw(body)).await
    }

    async fn start(behaviour: Behaviour) -> Self {
        let last_request = Arc::new(Mutex::new(None));
        let state = FakeState { behaviour, last_request: last_request.clone() };
        let app = Router::new().route("/predict", post(handle)).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, last_request }
    }

    pub(crate) fn url(&self) -> String {
        format!("http://{}/predict", self.addr)
    }

    pub(crate) async fn last_request(&self) -> Option<Value> {
        self.last_request.lock().await.clone()
    }
}

async fn handle(State(state): State<FakeState>, Json(body): Json<Value>) -> Response {
    *state.last_request.lock().await = Some(body);
    match state.behaviour {
        Behaviour::Answer(value) => Json(value).into_response(),
        Behaviour::Hang(delay) => {
            tokio::time::sleep(delay).await;
            Json(serde_json::json!({"label": "confirmed", "confidence": 0.5})).into_response()
        }
        Behaviour::Fail(status) => {
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (code, "model crashed").into_response()
        }
        Behaviour::Raw(text) => text.into_response(),
    }
}
