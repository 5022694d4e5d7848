//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; [`AppError`] maps
//! [`sr_core::Error`] to a status code and a JSON body.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Seconds a client should wait before retrying a busy admission.
const RETRY_AFTER_SECS: u64 = 5;

/// Wrapper so we can implement `IntoResponse` for an external type.
pub struct AppError {
    inner: sr_core::Error,
}

impl AppError {
    pub fn new(inner: sr_core::Error) -> Self {
        Self { inner }
    }
}

impl From<sr_core::Error> for AppError {
    fn from(e: sr_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let mut body = json!({
            "error": self.inner.to_string(),
            "code": self.inner.code(),
        });
        if let sr_core::Error::RenderInFlight { job_id, age_secs } = &self.inner {
            body["job_id"] = json!(job_id);
            body["age_secs"] = json!(age_secs);
        }

        let mut response = (status, axum::Json(body)).into_response();
        if self.inner.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}
