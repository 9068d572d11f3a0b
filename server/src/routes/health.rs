//! Health check endpoint

use axum::{extract::State, http::StatusCode, Json};
use lungscan::ClassifierVariant;
use serde::Serialize;

use crate::state::{ModelState, SharedState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub ready: bool,
    pub model_loaded: bool,
    pub classifier: Option<ClassifierVariant>,
    pub fallback: bool,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health - Liveness and readiness probe
///
/// 200 once a classifier is serving, 503 otherwise.
pub async fn health_check(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, classifier, fallback) = match &state.model {
        ModelState::Ready(service) => {
            let handle = service.handle();
            (StatusCode::OK, Some(handle.variant()), handle.is_fallback())
        }
        ModelState::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, None, false),
    };
    let ready = status == StatusCode::OK;

    let body = HealthResponse {
        status: if ready { "ok" } else { "unavailable" }.to_string(),
        ready,
        model_loaded: classifier == Some(ClassifierVariant::Real),
        classifier,
        fallback,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (status, Json(body))
}
