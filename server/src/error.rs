//! HTTP error mapping
//!
//! Client errors carry their message; server-side failures are logged and
//! answered with an opaque body.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lungscan::LungScanError;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Error raised by the prediction pipeline
    Service(LungScanError),
    /// Malformed multipart upload
    Multipart(MultipartError),
    /// Missing file part or disallowed extension
    BadRequest(String),
    /// The model never loaded
    ServiceUnavailable(String),
    /// Inference exceeded the request deadline
    Timeout,
    /// Failure outside the pipeline (e.g. a panicked worker)
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Service(e) => match e {
                LungScanError::InvalidImage(_) => StatusCode::BAD_REQUEST,
                LungScanError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                LungScanError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Multipart(e) => e.status(),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller
    fn public_message(&self) -> String {
        match self {
            ApiError::Service(e) if e.is_client_error() => e.to_string(),
            ApiError::Service(LungScanError::ModelLoad(_)) | ApiError::ServiceUnavailable(_) => {
                "model not loaded".to_string()
            }
            ApiError::Multipart(e) => e.body_text(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Timeout => "inference timed out".to_string(),
            ApiError::Service(_) | ApiError::Internal(_) => "internal error".to_string(),
        }
    }
}

impl From<LungScanError> for ApiError {
    fn from(err: LungScanError) -> Self {
        ApiError::Service(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            ApiError::Service(e) if !e.is_client_error() => error!(error = %e, "Prediction failed"),
            ApiError::Internal(msg) => error!("Internal error: {}", msg),
            ApiError::ServiceUnavailable(reason) => warn!(%reason, "Rejected request, model unavailable"),
            ApiError::Timeout => warn!("Inference timed out"),
            _ => {}
        }

        let body = ErrorBody {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(LungScanError::InvalidImage("x".into())), 400),
            (
                ApiError::from(LungScanError::PayloadTooLarge { size: 2, limit: 1 }),
                413,
            ),
            (ApiError::from(LungScanError::ModelLoad("x".into())), 503),
            (ApiError::from(LungScanError::Inference("x".into())), 500),
            (ApiError::from(LungScanError::Config("x".into())), 500),
            (ApiError::BadRequest("x".into()), 400),
            (ApiError::ServiceUnavailable("x".into()), 503),
            (ApiError::Timeout, 504),
            (ApiError::Internal("x".into()), 500),
        ];

        for (err, code) in cases {
            assert_eq!(err.status().as_u16(), code, "{:?}", err);
        }
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = ApiError::from(LungScanError::Inference("tensor shape [1, 7]".into()));
        assert_eq!(err.public_message(), "internal error");

        let err = ApiError::ServiceUnavailable("weights file not found: /secret/path".into());
        assert_eq!(err.public_message(), "model not loaded");

        let err = ApiError::from(LungScanError::InvalidImage("empty payload".into()));
        assert!(err.public_message().contains("empty payload"));
    }
}
