//! Audit log resources, written by the queue consumers and read back through
//! the list endpoints.

use adm_core::{Column, Resource, Schema};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One login attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysLoginLog {
    pub info_id: i64,
    pub username: String,
    /// `"0"` success, `"1"` failure.
    pub status: String,
    pub ipaddr: String,
    pub login_location: String,
    pub browser: String,
    pub os: String,
    pub platform: String,
    pub login_time: Option<DateTime<Utc>>,
    pub msg: String,
    pub create_by: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for SysLoginLog {
    const SCHEMA: &'static Schema = &Schema {
        table: "sys_login_log",
        primary_key: "info_id",
        columns: &[
            Column::int("info_id"),
            Column::text("username"),
            Column::text("status"),
            Column::text("ipaddr"),
            Column::text("login_location"),
            Column::text("browser"),
            Column::text("os"),
            Column::text("platform"),
            Column::time("login_time"),
            Column::text("msg"),
            Column::int("create_by"),
            Column::time("created_at"),
        ],
        owner_column: Some("create_by"),
        org_column: None,
    };
}

/// One handled API request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysOperaLog {
    pub opera_id: i64,
    pub request_method: String,
    pub oper_url: String,
    pub oper_ip: String,
    pub oper_name: String,
    pub user_agent: String,
    pub request_id: String,
    /// HTTP status of the response.
    pub status: i64,
    pub latency_ms: i64,
    pub oper_time: Option<DateTime<Utc>>,
    pub dept_id: Option<i64>,
    pub create_by: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for SysOperaLog {
    const SCHEMA: &'static Schema = &Schema {
        table: "sys_opera_log",
        primary_key: "opera_id",
        columns: &[
            Column::int("opera_id"),
            Column::text("request_method"),
            Column::text("oper_url"),
            Column::text("oper_ip"),
            Column::text("oper_name"),
            Column::text("user_agent"),
            Column::text("request_id"),
            Column::int("status"),
            Column::int("latency_ms"),
            Column::time("oper_time"),
            Column::int("dept_id"),
            Column::int("create_by"),
            Column::time("created_at"),
        ],
        owner_column: Some("create_by"),
        org_column: Some("dept_id"),
    };
}
