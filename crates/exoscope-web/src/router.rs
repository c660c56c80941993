//! Axum router — maps all URL paths to handlers.

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::handlers::{
    admin, analytics::analytics_page, api,
    candidates::{candidate_detail, candidates_page, reanalyze},
    datasets::{dataset_detail, datasets_page},
    health::health,
    home::home,
    predict::{predict_form, predict_result, predict_submit},
    predictions::predictions_page,
    upload::{upload_form, upload_submit},
};
use crate::state::AppState;

/// Room for the multipart framing and text fields around the file.
const UPLOAD_SLACK: usize = 64 * 1024;

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.loader.max_bytes().saturating_add(UPLOAD_SLACK);
    let static_dir = state.config.server.static_dir.clone();

    Router::new()
        // Pages
        .route("/",                          get(home))
        .route("/datasets",                  get(datasets_page))
        .route("/datasets/{id}",             get(dataset_detail))
        .route("/candidates",                get(candidates_page))
        .route("/candidates/{id}",           get(candidate_detail))
        .route("/candidates/{id}/reanalyze", post(reanalyze))
        .route("/predict",                   get(predict_form).post(predict_submit))
        .route("/predict/result/{id}",       get(predict_result))
        .route("/predictions",               get(predictions_page))
        .route("/analytics",                 get(analytics_page))
        .route(
            "/upload",
            get(upload_form).post(upload_submit).layer(DefaultBodyLimit::max(upload_limit)),
        )

        // Administration
        .route("/admin",                            get(admin::index))
        .route("/admin/login",                      get(admin::login_form).post(admin::login_submit))
        .route("/admin/logout",                     post(admin::logout))
        .route("/admin/datasets",                   get(admin::datasets))
        .route("/admin/datasets/new",               get(admin::new_dataset).post(admin::create_dataset))
        .route("/admin/datasets/{id}/edit",         get(admin::edit_dataset).post(admin::update_dataset))
        .route("/admin/datasets/{id}/delete",       post(admin::delete_dataset))
        .route("/admin/candidates",                 get(admin::candidates))
        .route("/admin/candidates/new",             get(admin::new_candidate).post(admin::create_candidate))
        .route("/admin/candidates/{id}/edit",       get(admin::edit_candidate).post(admin::update_candidate))
        .route("/admin/candidates/{id}/delete",     post(admin::delete_candidate))

        // API endpoints
        .route("/api/candidates",      get(api::candidates))
        .route("/api/candidates/{id}", get(api::candidate))
        .route("/api/datasets",        get(api::datasets))
        .route("/api/dashboard",       get(api::dashboard))
        .route("/api/predict",         post(api::predict))
        .route("/health",              get(health))

        // Static files
        .nest_service("/static", ServeDir::new(static_dir))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, state.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_state, StubPredictor};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, Response};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const FORM: &str = "name=Kepler-22b&orbital_period=289.86&transit_duration=7.4&planetary_radius=2.38\
        &stellar_radius=0.98&stellar_mass=0.97&stellar_effective_temperature=5518\
        &transit_depth=492&impact_parameter=0.3&equilibrium_temperature=262";

    async fn body_text(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn form_post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json_post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state(StubPredictor::confirmed(), None).await);
        let response = app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["predictions"], 0);
    }

    #[tokio::test]
    async fn test_pages_render() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        for uri in ["/", "/datasets", "/candidates", "/predict", "/predictions", "/analytics"] {
            let app = build_router(state.clone());
            let response = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_cookieless_reads_start_no_sessions() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        for _ in 0..5 {
            for uri in ["/", "/candidates"] {
                let response = build_router(state.clone())
                    .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::OK, "{uri}");
                assert!(!response.headers().contains_key(header::SET_COOKIE), "{uri}");
            }
        }
        assert_eq!(state.db.stats().await.unwrap().analysis_sessions, 0);

        let filtered = build_router(state.clone())
            .oneshot(Request::get("/candidates?classification=CONFIRMED").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(filtered.status(), StatusCode::OK);
        assert!(filtered.headers().contains_key(header::SET_COOKIE));
        assert_eq!(state.db.stats().await.unwrap().analysis_sessions, 1);
    }

    #[tokio::test]
    async fn test_predict_form_success_redirects_and_stores() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        let response = build_router(state.clone()).oneshot(form_post("/predict", FORM)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        assert!(location.starts_with("/predict/result/"));
        assert!(response.headers().contains_key(header::SET_COOKIE));
        assert_eq!(state.predictions.count().await.unwrap(), 1);

        let page = build_router(state).oneshot(Request::get(&location).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(page.status(), StatusCode::OK);
        assert!(body_text(page).await.contains("Kepler-22b"));
    }

    #[tokio::test]
    async fn test_predict_form_invalid_keeps_values() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        let body = FORM.replace("impact_parameter=0.3", "impact_parameter=1.5");
        let response = build_router(state.clone()).oneshot(form_post("/predict", &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let html = body_text(response).await;
        assert!(html.contains("289.86"));
        assert!(html.contains("must be between 0 and 1"));
        assert_eq!(state.predictions.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_predict_form_predictor_down() {
        let state = test_state(StubPredictor::failing(), None).await;
        let response = build_router(state.clone()).oneshot(form_post("/predict", FORM)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.predictions.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_api_predict() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        let body = json!({
            "name": "TOI-700 d",
            "orbital_period": 37.42, "transit_duration": 3.2, "planetary_radius": 1.07,
            "stellar_radius": 0.42, "stellar_mass": 0.41, "stellar_effective_temperature": 3480,
            "transit_depth": 810, "impact_parameter": 0.4, "equilibrium_temperature": 269
        });
        let response = build_router(state.clone()).oneshot(json_post("/api/predict", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let out: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(out["prediction"], "CONFIRMED");
        assert_eq!(out["name"], "TOI-700 d");
        assert_eq!(state.predictions.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_api_predict_reports_field_errors() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        let response = build_router(state)
            .oneshot(json_post("/api/predict", json!({ "name": "", "orbital_period": -1 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let out: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(out["fields"]["name"].is_string());
        assert!(out["fields"]["orbital_period"].is_string());
        assert!(out["fields"]["stellar_mass"].is_string());
    }

    #[tokio::test]
    async fn test_api_predict_unreadable_body_is_json_error() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        let requests = [
            Request::post("/api/predict")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"name\": "))
                .unwrap(),
            Request::post("/api/predict")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("name=Kepler-22b"))
                .unwrap(),
        ];
        for request in requests {
            let response = build_router(state.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let out: Value = serde_json::from_str(&body_text(response).await).unwrap();
            assert!(out["error"].is_string());
            assert!(out["fields"]["body"].is_string());
        }
        assert_eq!(state.predictions.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_api_predict_predictor_down() {
        let state = test_state(StubPredictor::failing(), None).await;
        let body: Value = form_as_json(FORM);
        let response = build_router(state.clone()).oneshot(json_post("/api/predict", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.predictions.count().await.unwrap(), 0);
    }

    fn form_as_json(form: &str) -> Value {
        let map: serde_json::Map<String, Value> = url::form_urlencoded::parse(form.as_bytes())
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();
        Value::Object(map)
    }

    #[tokio::test]
    async fn test_api_candidates_rejects_bad_filter() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        let response = build_router(state)
            .oneshot(Request::get("/api/candidates?min_orbital_period=abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_requires_token_when_configured() {
        let state = test_state(StubPredictor::confirmed(), Some("letmein")).await;

        let denied = build_router(state.clone())
            .oneshot(Request::get("/admin/datasets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let allowed = build_router(state.clone())
            .oneshot(
                Request::get("/admin/datasets")
                    .header(header::AUTHORIZATION, "Bearer letmein")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let login = build_router(state).oneshot(form_post("/admin/login", "token=letmein")).await.unwrap();
        assert_eq!(login.status(), StatusCode::SEE_OTHER);
        assert!(login.headers().contains_key(header::SET_COOKIE));
    }

    fn multipart_upload(fields: &[(&str, &str)], file_name: &str, file: &str) -> Request<Body> {
        const BOUNDARY: &str = "exoscope-test-boundary";
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/csv\r\n\r\n{file}\r\n--{BOUNDARY}--\r\n"
        ));
        Request::post("/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_imports_valid_rows_and_reports_the_rest() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        let csv = "kepoi_name,koi_period,koi_duration,koi_prad,koi_srad,koi_steff,koi_disposition\n\
                   K00752.01,9.48,2.95,2.26,0.93,5455,CONFIRMED\n\
                   K00752.02,abc,4.50,2.83,0.93,5455,CANDIDATE\n\
                   K00753.01,19.89,1.78,14.60,0.79,5853,FALSE POSITIVE\n";
        let request = multipart_upload(&[("name", "Kepler KOI"), ("mission", "Kepler")], "koi.csv", csv);
        let response = build_router(state.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("orbital_period"));
        assert_eq!(state.candidates.count().await.unwrap(), 2);
        assert_eq!(state.datasets.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upload_bad_format_creates_nothing() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        let request = multipart_upload(&[("name", "Notes"), ("mission", "Other")], "notes.txt", "hello");
        let response = build_router(state.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.datasets.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reanalyze_updates_candidate() {
        use exoscope_common::{Classification, Mission, ParameterSet};
        use exoscope_db::{NewCandidate, NewDataset};

        let state = test_state(StubPredictor::confirmed(), None).await;
        let dataset = state.datasets.insert(&NewDataset::new("Kepler", Mission::Kepler)).await.unwrap();
        let params = ParameterSet {
            orbital_period: 9.48,
            transit_duration: 2.95,
            planetary_radius: 2.26,
            stellar_radius: 0.93,
            stellar_mass: 0.92,
            stellar_effective_temperature: 5455.0,
            transit_depth: 615.8,
            impact_parameter: 0.15,
            equilibrium_temperature: 793.0,
        };
        let candidate = state
            .candidates
            .insert(&NewCandidate::new(dataset.id, "K00752.01", params))
            .await
            .unwrap();

        let response = build_router(state.clone())
            .oneshot(form_post(&format!("/candidates/{}/reanalyze", candidate.id), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let updated = state.candidates.get(candidate.id).await.unwrap();
        assert_eq!(updated.ml_prediction, Some(Classification::Confirmed));
        assert_eq!(state.predictions.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_admin_creates_dataset() {
        let state = test_state(StubPredictor::confirmed(), None).await;
        let response = build_router(state.clone())
            .oneshot(form_post("/admin/datasets/new", "name=Kepler+DR25&mission=Kepler&is_active=on"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let datasets = state.datasets.list(true).await.unwrap();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].name, "Kepler DR25");
    }
}
