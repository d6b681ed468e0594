//! # Principal Middleware
//!
//! Resolves the caller of every `/v1` request into a [`Principal`] and
//! injects it as a [`Caller`] extension. Verification only: tokens are
//! issued elsewhere and shared with this service as one secret.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{user_id}:{dept_id}:{secret}   dept_id may be empty
//! Bearer {secret}                              legacy, treated as admin
//! ```
//!
//! With no `auth.token` configured, every request runs as the admin
//! principal (development mode).

use std::sync::Arc;

use adm_core::Principal;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::extractors::{Caller, RequestContext};
use crate::state::{AppState, ADMIN_ROLE};

/// Constant-time comparison of bearer secrets.
///
/// When lengths differ, performs a dummy comparison so the timing does not
/// reveal whether the length matched.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Identity claimed by a verified token, before policy lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub role_key: String,
    pub user_id: i64,
    pub dept_id: Option<i64>,
}

/// Parse and verify a bearer token.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<TokenClaims, String> {
    let parts: Vec<&str> = provided.splitn(4, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(TokenClaims {
                    role_key: ADMIN_ROLE.to_string(),
                    user_id: 1,
                    dept_id: None,
                })
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role, user, dept, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            if role.is_empty() {
                return Err("empty role".into());
            }
            let user_id = user
                .parse::<i64>()
                .map_err(|e| format!("invalid user_id: {e}"))?;
            let dept_id = if dept.is_empty() {
                None
            } else {
                Some(dept.parse::<i64>().map_err(|e| format!("invalid dept_id: {e}"))?)
            };
            Ok(TokenClaims {
                role_key: (*role).to_string(),
                user_id,
                dept_id,
            })
        }
        _ => Err("invalid token format; expected {role}:{user_id}:{dept_id}:{secret} or {secret}".into()),
    }
}

fn resolve_principal(state: &AppState, request: &Request) -> Result<Principal, String> {
    let Some(expected) = state.config.auth.token.as_deref() else {
        return Ok(state.admin_principal());
    };

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or("missing authorization header")?;
    let provided = header_value
        .strip_prefix("Bearer ")
        .ok_or("authorization header must use Bearer scheme")?;

    let claims = parse_bearer_token(provided, expected)?;
    if claims.role_key == ADMIN_ROLE && claims.user_id == 1 && claims.dept_id.is_none() {
        return Ok(state.admin_principal());
    }
    let username = format!("{}-{}", claims.role_key, claims.user_id);
    state
        .principal(claims.user_id, username, &claims.role_key, claims.dept_id)
        .ok_or_else(|| format!("unknown role: {}", claims.role_key))
}

/// Authenticate the request and inject its [`Caller`].
pub async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    match resolve_principal(&state, &request) {
        Ok(principal) => {
            request.extensions_mut().insert(Caller(Arc::new(principal)));
            next.run(request).await
        }
        Err(reason) => {
            tracing::warn!(%reason, path = %request.uri().path(), "authentication failed");
            let ctx = RequestContext::from_headers(request.headers(), state.config.application.locale);
            AppError::Unauthorized(reason).in_context(&ctx).into_response()
        }
    }
}
