//! Queue consumers that persist audit events.
//!
//! Each consumer is registered for exactly one topic. Failures are returned
//! to the broker, which logs them and moves on to the next message.

use std::sync::Arc;

use adm_core::{CompareOp, Predicate, Query, Resource, Value};
use adm_queue::{BrokerBuilder, HandlerError, Message};
use chrono::Utc;

use crate::db::{DataSource, DataSourceError, Row};
use crate::models::events::{AuditEvent, API_CHECK, LOGIN_LOG, OPERATE_LOG};
use crate::models::{SysApi, SysLoginLog, SysOperaLog};
use crate::routes::ApiRoute;

/// Register every audit consumer on `builder`.
pub fn register(builder: &mut BrokerBuilder<AuditEvent>, data: Arc<dyn DataSource>) {
    let d = Arc::clone(&data);
    builder.register(LOGIN_LOG, move |m| save_login_log(Arc::clone(&d), m));
    let d = Arc::clone(&data);
    builder.register(OPERATE_LOG, move |m| save_opera_log(Arc::clone(&d), m));
    builder.register(API_CHECK, move |m| save_sys_api(Arc::clone(&data), m));
}

/// A new row for `R`, with the primary key left for the store to assign.
fn new_row<R: Resource>(record: &R) -> Result<Row, HandlerError> {
    match serde_json::to_value(record).map_err(HandlerError::new)? {
        serde_json::Value::Object(mut row) => {
            row.remove(R::SCHEMA.primary_key);
            Ok(row)
        }
        _ => Err(HandlerError::new(format!("{} did not serialize to an object", R::table_name()))),
    }
}

fn unexpected(topic: &str) -> HandlerError {
    HandlerError::new(format!("unexpected payload on topic {topic}"))
}

pub async fn save_login_log(
    data: Arc<dyn DataSource>,
    message: Arc<Message<AuditEvent>>,
) -> Result<(), HandlerError> {
    let AuditEvent::LoginLog(record) = &message.payload else {
        return Err(unexpected(message.topic));
    };
    let log = SysLoginLog {
        username: record.username.clone(),
        status: if record.success { "0" } else { "1" }.to_string(),
        ipaddr: record.ip.clone(),
        browser: record.user_agent.clone(),
        login_time: Some(record.at),
        msg: record.message.clone(),
        create_by: record.user_id,
        created_at: Some(Utc::now()),
        ..SysLoginLog::default()
    };
    data.insert(SysLoginLog::SCHEMA, new_row(&log)?)
        .await
        .map_err(HandlerError::new)
}

pub async fn save_opera_log(
    data: Arc<dyn DataSource>,
    message: Arc<Message<AuditEvent>>,
) -> Result<(), HandlerError> {
    let AuditEvent::OperateLog(record) = &message.payload else {
        return Err(unexpected(message.topic));
    };
    let log = SysOperaLog {
        request_method: record.method.clone(),
        oper_url: record.path.clone(),
        oper_ip: record.client_ip.clone(),
        oper_name: record.username.clone(),
        user_agent: record.user_agent.clone(),
        request_id: record.request_id.clone(),
        status: i64::from(record.status),
        latency_ms: i64::try_from(record.latency_ms).unwrap_or(i64::MAX),
        oper_time: Some(record.at),
        dept_id: record.dept_id,
        create_by: record.user_id,
        created_at: Some(Utc::now()),
        ..SysOperaLog::default()
    };
    data.insert(SysOperaLog::SCHEMA, new_row(&log)?)
        .await
        .map_err(HandlerError::new)
}

async fn api_exists(data: &dyn DataSource, route: &ApiRoute) -> Result<bool, DataSourceError> {
    let plan = Query::table(SysApi::SCHEMA)
        .filter(Predicate::Compare {
            column: "path",
            op: CompareOp::Eq,
            value: Value::Text(route.path.clone()),
        })
        .filter(Predicate::Compare {
            column: "action",
            op: CompareOp::Eq,
            value: Value::Text(route.method.clone()),
        })
        .restrict(Predicate::True);
    match data.count(&plan).await {
        Ok(n) => Ok(n > 0),
        Err(DataSourceError::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Record every route not yet known by `(path, method)`.
pub async fn save_sys_api(
    data: Arc<dyn DataSource>,
    message: Arc<Message<AuditEvent>>,
) -> Result<(), HandlerError> {
    let AuditEvent::ApiCheck(routes) = &message.payload else {
        return Err(unexpected(message.topic));
    };

    let mut added = 0usize;
    let mut failed = 0usize;
    for route in routes {
        let result = match api_exists(data.as_ref(), route).await {
            Ok(true) => continue,
            Ok(false) => {
                let api = SysApi {
                    handle: route.handler.clone(),
                    title: route.title.clone(),
                    path: route.path.clone(),
                    action: route.method.clone(),
                    kind: "SYS".to_string(),
                    created_at: Some(Utc::now()),
                    ..SysApi::default()
                };
                match new_row(&api) {
                    Ok(row) => data.insert(SysApi::SCHEMA, row).await.map_err(HandlerError::new),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(HandlerError::new(e)),
        };
        match result {
            Ok(()) => added += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(path = %route.path, method = %route.method, error = %e, "failed to record api");
            }
        }
    }

    tracing::info!(added, known = routes.len() - added - failed, "api inventory recorded");
    if failed > 0 {
        return Err(HandlerError::new(format!("{failed} of {} routes not recorded", routes.len())));
    }
    Ok(())
}
