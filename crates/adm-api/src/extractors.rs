//! # Request Extractors
//!
//! [`RequestContext`] carries what error rendering and logging need (the
//! correlation id and the negotiated locale). [`Caller`] is the principal
//! the auth middleware resolved for this request.

use std::sync::Arc;

use adm_core::Principal;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::AppError;
use crate::i18n::Locale;
use crate::state::AppState;

/// Header carrying the correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request rendering context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Value of `x-request-id`, set by the request-id layer.
    pub request_id: Option<String>,
    /// Negotiated response language.
    pub locale: Locale,
}

impl RequestContext {
    /// Read the correlation id and negotiate the locale, falling back to
    /// `default_locale` when `accept-language` names nothing supported.
    pub fn from_headers(headers: &HeaderMap, default_locale: Locale) -> Self {
        Self {
            request_id: request_id(headers),
            locale: Locale::negotiate(headers, default_locale),
        }
    }
}

/// The `x-request-id` header, if present and valid UTF-8.
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, state.config.application.locale))
    }
}

/// The authenticated principal, injected by
/// [`auth_middleware`](crate::auth::auth_middleware).
#[derive(Debug, Clone)]
pub struct Caller(pub Arc<Principal>);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no principal in request context".into()))
    }
}
