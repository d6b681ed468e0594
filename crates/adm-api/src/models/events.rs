//! Audit events carried by the in-process queue.
//!
//! One variant per topic, so consumers match exhaustively and a payload can
//! never be published on the wrong topic.

use adm_queue::Payload;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::routes::ApiRoute;

pub const LOGIN_LOG: &str = "LoginLog";
pub const OPERATE_LOG: &str = "OperateLog";
pub const API_CHECK: &str = "ApiCheck";

/// Queue payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic", content = "data")]
pub enum AuditEvent {
    /// A login attempt, reported by the session issuer.
    LoginLog(LoginRecord),
    /// A handled request, reported by the operation-log middleware.
    OperateLog(OperateRecord),
    /// The route inventory, published at startup with `--api`.
    ApiCheck(Vec<ApiRoute>),
}

impl Payload for AuditEvent {
    fn topic(&self) -> &'static str {
        match self {
            Self::LoginLog(_) => LOGIN_LOG,
            Self::OperateLog(_) => OPERATE_LOG,
            Self::ApiCheck(_) => API_CHECK,
        }
    }
}

/// A login attempt, stored as a `sys_login_log` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginRecord {
    /// Authenticated user, `0` when the attempt failed before lookup.
    pub user_id: i64,
    /// Name the caller tried to log in as.
    pub username: String,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Client address.
    pub ip: String,
    pub user_agent: String,
    /// Outcome text shown in the console.
    pub message: String,
    pub at: DateTime<Utc>,
}

/// One handled API request, stored as a `sys_opera_log` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperateRecord {
    pub method: String,
    /// Request path without the query string.
    pub path: String,
    /// Response status code.
    pub status: u16,
    /// Time from request to response.
    pub latency_ms: u64,
    /// Caller's user id.
    pub user_id: i64,
    pub username: String,
    /// Caller's department, if any.
    pub dept_id: Option<i64>,
    /// Proxy headers first, else the socket peer.
    pub client_ip: String,
    pub user_agent: String,
    /// Correlation id, empty when absent.
    pub request_id: String,
    /// When the response was produced.
    pub at: DateTime<Utc>,
}
