//! LungScan HTTP server
//!
//! Routes:
//! - `GET  /health`           readiness probe
//! - `POST /api/predict`      multipart upload, field `file`
//! - `POST /api/predict/raw`  raw image bytes as the body

pub mod error;
pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

/// Build the application router around shared state
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.config.body_limit();

    Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))

        // Prediction
        .route("/api/predict", post(routes::predict::predict_upload))
        .route("/api/predict/raw", post(routes::predict::predict_raw))

        // Add state
        .with_state(state)

        // Add middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
