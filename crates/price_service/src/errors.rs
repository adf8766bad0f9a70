//! Service error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use realty_price_core::PricingError;
use realty_price_trainer::TrainerError;
use serde::Serialize;
use thiserror::Error;

/// Startup failures
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("model bootstrap failed: {0}")]
    Bootstrap(#[from] TrainerError),

    #[error("bootstrap task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Request failure rendered as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PricingError> for ApiError {
    fn from(err: PricingError) -> Self {
        let status = match &err {
            PricingError::UnknownPropertyType(_)
            | PricingError::InvalidParameters(_)
            | PricingError::ShapeMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PricingError::DatasetNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(detail = %err, "Request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!(detail = %err, "Blocking task failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}
