//! Operation-log middleware.
//!
//! Publishes one [`AuditEvent::OperateLog`] per handled request, after the
//! response is produced. `OPTIONS` requests and 404s are not recorded. The
//! request never waits on the consumer; it only waits on the channel when
//! the queue is full and configured to block.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::config::PublishFailurePolicy;
use crate::error::AppError;
use crate::extractors::{Caller, RequestContext};
use crate::models::{AuditEvent, OperateRecord};
use crate::state::AppState;

/// Best-effort client address: proxy headers first, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    forwarded
        .or(real)
        .map(str::to_owned)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_default()
}

pub async fn operation_log(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config.logger.operation_log || request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let started = Instant::now();
    let ctx = RequestContext::from_headers(request.headers(), state.config.application.locale);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let caller = request.extensions().get::<Caller>().cloned();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = client_ip(request.headers(), peer);
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let response = next.run(request).await;
    if response.status() == StatusCode::NOT_FOUND {
        return response;
    }

    let (user_id, username, dept_id) = match &caller {
        Some(Caller(p)) => (p.user_id, p.username.clone(), p.dept_id),
        None => (0, String::new(), None),
    };
    let record = OperateRecord {
        method,
        path,
        status: response.status().as_u16(),
        latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        user_id,
        username,
        dept_id,
        client_ip,
        user_agent,
        request_id: ctx.request_id.clone().unwrap_or_default(),
        at: Utc::now(),
    };

    match state.publisher.publish(AuditEvent::OperateLog(record)).await {
        Ok(()) => response,
        Err(e) => match state.config.queue.publish_failure {
            PublishFailurePolicy::LogAndContinue => {
                tracing::warn!(request_id = ?ctx.request_id, error = %e, "operation log not recorded");
                response
            }
            PublishFailurePolicy::FailRequest => {
                AppError::Internal(format!("operation log not recorded: {e}"))
                    .in_context(&ctx)
                    .into_response()
            }
        },
    }
}
