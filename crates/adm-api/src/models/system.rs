//! System resources: users, roles, registered APIs and scheduled jobs.

use adm_core::{Column, Resource, Schema};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A back-office user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysUser {
    pub user_id: i64,
    pub username: String,
    pub nick_name: String,
    pub phone: String,
    pub email: String,
    pub role_id: i64,
    pub dept_id: Option<i64>,
    pub status: String,
    pub create_by: i64,
    pub update_by: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource for SysUser {
    const SCHEMA: &'static Schema = &Schema {
        table: "sys_user",
        primary_key: "user_id",
        columns: &[
            Column::int("user_id"),
            Column::text("username"),
            Column::text("nick_name"),
            Column::text("phone"),
            Column::text("email"),
            Column::int("role_id"),
            Column::int("dept_id"),
            Column::text("status"),
            Column::int("create_by"),
            Column::int("update_by"),
            Column::time("created_at"),
            Column::time("updated_at"),
        ],
        owner_column: Some("create_by"),
        org_column: Some("dept_id"),
    };
}

/// A role and the data scope label shown in the console.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysRole {
    pub role_id: i64,
    pub role_name: String,
    pub role_key: String,
    pub role_sort: i64,
    pub status: String,
    pub data_scope: String,
    pub admin: bool,
    pub remark: String,
    pub create_by: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for SysRole {
    const SCHEMA: &'static Schema = &Schema {
        table: "sys_role",
        primary_key: "role_id",
        columns: &[
            Column::int("role_id"),
            Column::text("role_name"),
            Column::text("role_key"),
            Column::int("role_sort"),
            Column::text("status"),
            Column::text("data_scope"),
            Column::bool("admin"),
            Column::text("remark"),
            Column::int("create_by"),
            Column::time("created_at"),
        ],
        owner_column: Some("create_by"),
        org_column: None,
    };
}

/// A route discovered from the router's inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysApi {
    pub id: i64,
    pub handle: String,
    pub title: String,
    pub path: String,
    /// HTTP method.
    pub action: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub create_by: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for SysApi {
    const SCHEMA: &'static Schema = &Schema {
        table: "sys_api",
        primary_key: "id",
        columns: &[
            Column::int("id"),
            Column::text("handle"),
            Column::text("title"),
            Column::text("path"),
            Column::text("action"),
            Column::text("type"),
            Column::int("create_by"),
            Column::time("created_at"),
        ],
        owner_column: Some("create_by"),
        org_column: None,
    };
}

/// A persisted job definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysJob {
    pub job_id: i64,
    pub job_name: String,
    pub job_group: String,
    pub invoke_target: String,
    pub interval_secs: i64,
    pub status: String,
    pub create_by: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for SysJob {
    const SCHEMA: &'static Schema = &Schema {
        table: "sys_job",
        primary_key: "job_id",
        columns: &[
            Column::int("job_id"),
            Column::text("job_name"),
            Column::text("job_group"),
            Column::text("invoke_target"),
            Column::int("interval_secs"),
            Column::text("status"),
            Column::int("create_by"),
            Column::time("created_at"),
        ],
        owner_column: Some("create_by"),
        org_column: None,
    };
}
