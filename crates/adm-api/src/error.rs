//! # API Error Types
//!
//! [`AppError`] classifies request-boundary failures. Turned into a response
//! through [`AppError::in_context`], it picks up the caller's locale and the
//! request id so every error body has the same envelope:
//!
//! ```json
//! { "code": "VALIDATION_ERROR", "message": "Parameter validation failed",
//!   "requestId": "…", "details": { "reason": "…" } }
//! ```
//!
//! Internal error text is logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extractors::RequestContext;
use crate::i18n::{Locale, MessageKey};

/// JSON error envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub code: String,
    /// Localised human-readable message.
    pub message: String,
    /// Correlation id of the failed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Client-error context; never present on 500s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// List parameters could not be bound (422).
    #[error("validation error: {0}")]
    Validation(#[from] adm_core::ValidationError),

    /// Query string or body could not be decoded (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A data-source query failed (500).
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Any other internal failure (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::QueryFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "QUERY_FAILED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message_key(&self) -> MessageKey {
        match self {
            Self::Validation(_) => MessageKey::ValidationFailed,
            Self::BadRequest(_) => MessageKey::BadRequest,
            Self::Unauthorized(_) => MessageKey::Unauthorized,
            Self::QueryFailed(_) => MessageKey::QueryFailed,
            Self::Internal(_) => MessageKey::Internal,
        }
    }

    /// Attach the request's locale and correlation id.
    pub fn in_context(self, ctx: &RequestContext) -> ErrorResponse {
        ErrorResponse {
            error: self,
            locale: ctx.locale,
            request_id: ctx.request_id.clone(),
        }
    }
}

/// An [`AppError`] bound to a request, ready to render.
#[derive(Debug)]
pub struct ErrorResponse {
    error: AppError,
    locale: Locale,
    request_id: Option<String>,
}

impl ErrorResponse {
    /// The underlying error.
    pub fn error(&self) -> &AppError {
        &self.error
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let (status, code) = self.error.status_and_code();
        let request_id = self.request_id.as_deref().unwrap_or("-");

        let details = match &self.error {
            AppError::Validation(e) => {
                tracing::debug!(request_id, error = %e, "rejected list parameters");
                Some(serde_json::json!({ "reason": e.to_string() }))
            }
            AppError::BadRequest(reason) | AppError::Unauthorized(reason) => {
                Some(serde_json::json!({ "reason": reason }))
            }
            AppError::QueryFailed(_) | AppError::Internal(_) => {
                tracing::error!(request_id, error = %self.error, "internal server error");
                None
            }
        };

        let body = ErrorBody {
            code: code.to_string(),
            message: self.locale.message(self.error.message_key()).to_string(),
            request_id: self.request_id,
            details,
        };
        (status, Json(body)).into_response()
    }
}

/// Render without request context: default locale, no request id.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.in_context(&RequestContext::default()).into_response()
    }
}
