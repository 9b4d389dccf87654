// ABOUTME: Gateway error type — maps caller and server failures onto JSON error responses.
// ABOUTME: Renders as {error, details?} with a matching HTTP status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required field is missing or blank.
    #[error("{0}")]
    BadRequest(String),
    /// The body could not be decoded.
    #[error("Invalid request body")]
    InvalidBody(String),
    #[error("Speech synthesis unavailable")]
    SpeechUnavailable,
    #[error("Endpoint not found")]
    NotFound,
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::SpeechUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let details = match &self {
            Self::InvalidBody(details) => Some(details.clone()),
            Self::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                Some(e.to_string())
            }
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            details,
        };
        (self.status(), Json(body)).into_response()
    }
}
