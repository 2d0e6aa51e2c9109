use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::outbox::OutboxError;
use crate::supervisor::SupervisorError;

/// Errors returned by HTTP handlers, rendered as `{ "error", "kind" }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("malformed request body: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Outbox(#[from] OutboxError),

    #[error(transparent)]
    Degraded(#[from] SupervisorError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Outbox(e) => e.kind(),
            ApiError::Degraded(e) => e.kind(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::MalformedMessage => StatusCode::BAD_REQUEST,
            ErrorKind::Degraded => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Storage | ErrorKind::BrokerTransient | ErrorKind::PoisonMessage => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string(), "kind": self.kind() });
        (self.status_code(), Json(body)).into_response()
    }
}
