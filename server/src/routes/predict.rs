//! Prediction endpoints

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    Json,
};
use lungscan::{PredictionResult, PredictionService};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::SharedState;

/// Multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

/// File extensions accepted on multipart uploads
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

fn check_file_name(file_name: &str) -> Result<(), ApiError> {
    if file_name.is_empty() {
        return Err(ApiError::BadRequest("no file selected".to_string()));
    }

    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) => {
            Err(ApiError::BadRequest(format!(
                "file type '.{}' not allowed, expected one of {}",
                ext,
                ALLOWED_EXTENSIONS.join(", ")
            )))
        }
        // Content is still sniffed by the preprocessor
        _ => Ok(()),
    }
}

/// POST /api/predict - Classify a multipart upload (field `file`)
pub async fn predict_upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResult>, ApiError> {
    let service = state.service()?;

    let mut payload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        if let Some(file_name) = field.file_name() {
            check_file_name(file_name)?;
        }
        payload = Some(field.bytes().await?);
        break;
    }

    let bytes = payload.ok_or_else(|| {
        ApiError::BadRequest(format!("missing multipart field '{}'", UPLOAD_FIELD))
    })?;

    classify(&state, service, bytes).await.map(Json)
}

/// POST /api/predict/raw - Classify the raw request body
pub async fn predict_raw(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<PredictionResult>, ApiError> {
    let service = state.service()?;
    classify(&state, service, body).await.map(Json)
}

/// Run the CPU-bound pipeline on the blocking pool under the request deadline
///
/// On timeout the response is abandoned; the blocking task runs to completion
/// against the shared, unmodified model.
async fn classify(
    state: &SharedState,
    service: Arc<PredictionService>,
    bytes: Bytes,
) -> Result<PredictionResult, ApiError> {
    let payload_bytes = bytes.len();
    let deadline = state.config.request_timeout();

    let task = tokio::task::spawn_blocking(move || service.classify(&bytes));

    match tokio::time::timeout(deadline, task).await {
        Err(_) => {
            warn!(payload_bytes, timeout_secs = deadline.as_secs(), "Request deadline exceeded");
            Err(ApiError::Timeout)
        }
        Ok(Err(join_error)) => Err(ApiError::Internal(format!(
            "inference task failed: {}",
            join_error
        ))),
        Ok(Ok(result)) => {
            let result = result?;
            debug!(
                payload_bytes,
                label = %result.label,
                confidence = result.confidence,
                "Prediction served"
            );
            Ok(result)
        }
    }
}
