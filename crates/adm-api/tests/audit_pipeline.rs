//! Operation logs and API discovery flowing through the queue into storage.

mod common;

use std::sync::Arc;
use std::time::Duration;

use adm_api::config::{AppConfig, PublishFailurePolicy};
use adm_api::db::MemoryDataSource;
use adm_api::models::{AuditEvent, LoginRecord, SysApi, SysLoginLog, SysOperaLog};
use adm_core::Resource;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::Utc;

use common::*;

const DRAIN: Duration = Duration::from_secs(5);

fn logging_config() -> AppConfig {
    AppConfig::default()
}

#[tokio::test]
async fn handled_request_is_recorded_once() {
    let store = Arc::new(MemoryDataSource::new());
    seed_users(&store, 3);
    let app = build(logging_config(), store.clone());

    let request = Request::builder()
        .uri("/v1/sys-user?pageSize=2")
        .header("user-agent", "integration-test")
        .header("x-forwarded-for", "203.0.113.7")
        .header("x-request-id", "op-1")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(app.consumer.shutdown(DRAIN).await);
    let rows = store.rows(SysOperaLog::SCHEMA);
    assert_eq!(rows.len(), 1);
    let log = &rows[0];
    assert_eq!(log["request_method"], "GET");
    assert_eq!(log["oper_url"], "/v1/sys-user");
    assert_eq!(log["oper_ip"], "203.0.113.7");
    assert_eq!(log["user_agent"], "integration-test");
    assert_eq!(log["request_id"], "op-1");
    assert_eq!(log["status"], 200);
    assert_eq!(log["create_by"], 1);
    assert_eq!(log["opera_id"], 1);
}

#[tokio::test]
async fn failed_requests_are_recorded_with_their_status() {
    let store = Arc::new(MemoryDataSource::new());
    let app = build(logging_config(), store.clone());

    let response = send(&app.router, get("/v1/sys-user?pageSize=abc")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert!(app.consumer.shutdown(DRAIN).await);
    let rows = store.rows(SysOperaLog::SCHEMA);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], 422);
}

#[tokio::test]
async fn options_and_unknown_routes_are_not_recorded() {
    let store = Arc::new(MemoryDataSource::new());
    let app = build(logging_config(), store.clone());

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/sys-user")
        .body(Body::empty())
        .unwrap();
    send(&app.router, request).await;
    let response = send(&app.router, get("/v1/sys-nothing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    send(&app.router, get("/health/liveness")).await;

    assert!(app.consumer.shutdown(DRAIN).await);
    assert!(store.rows(SysOperaLog::SCHEMA).is_empty());
}

#[tokio::test]
async fn disabled_operation_log_records_nothing() {
    let store = Arc::new(MemoryDataSource::new());
    let app = build(quiet_config(), store.clone());

    send(&app.router, get("/v1/sys-user")).await;

    assert!(app.consumer.shutdown(DRAIN).await);
    assert!(store.rows(SysOperaLog::SCHEMA).is_empty());
}

#[tokio::test]
async fn scoped_caller_is_attributed() {
    let store = Arc::new(MemoryDataSource::new());
    let mut config = secured_config();
    config.logger.operation_log = true;
    let app = build(config, store.clone());

    let response = send(&app.router, get_as("/v1/sys-user", &format!("clerk:7:3:{SECRET}"))).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Rejected before the handler: not an operation.
    let response = send(&app.router, get("/v1/sys-user")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(app.consumer.shutdown(DRAIN).await);
    let rows = store.rows(SysOperaLog::SCHEMA);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["create_by"], 7);
    assert_eq!(rows[0]["dept_id"], 3);
    assert_eq!(rows[0]["oper_name"], "clerk-7");
}

#[tokio::test]
async fn closed_queue_is_tolerated_by_default() {
    let app = build(logging_config(), Arc::new(MemoryDataSource::new()));
    assert!(app.consumer.shutdown(DRAIN).await);

    let response = send(&app.router, get("/v1/sys-user")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn closed_queue_fails_the_request_when_configured() {
    let mut config = logging_config();
    config.queue.publish_failure = PublishFailurePolicy::FailRequest;
    let app = build(config, Arc::new(MemoryDataSource::new()));
    assert!(app.consumer.shutdown(DRAIN).await);

    let response = send(&app.router, get("/v1/sys-user")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn api_inventory_is_recorded_once() {
    let store = Arc::new(MemoryDataSource::new());
    let app = build(quiet_config(), store.clone());
    let (_, inventory) = adm_api::routes::api().into_parts();

    app.state
        .publisher
        .publish(AuditEvent::ApiCheck(inventory.clone()))
        .await
        .unwrap();
    app.state
        .publisher
        .publish(AuditEvent::ApiCheck(inventory.clone()))
        .await
        .unwrap();

    assert!(app.consumer.shutdown(DRAIN).await);
    let rows = store.rows(SysApi::SCHEMA);
    assert_eq!(rows.len(), inventory.len());
    let user = rows.iter().find(|r| r["path"] == "/v1/sys-user").unwrap();
    assert_eq!(user["action"], "GET");
    assert_eq!(user["handle"], "index<SysUser>");
    assert_eq!(user["type"], "SYS");
}

#[tokio::test]
async fn login_events_are_stored_and_listable() {
    let store = Arc::new(MemoryDataSource::new());
    let app = build(quiet_config(), store.clone());

    for (user, success) in [("alice", true), ("mallory", false)] {
        let event = AuditEvent::LoginLog(LoginRecord {
            user_id: 0,
            username: user.to_string(),
            success,
            ip: "198.51.100.4".to_string(),
            user_agent: "curl/8".to_string(),
            message: if success { "ok" } else { "bad password" }.to_string(),
            at: Utc::now(),
        });
        app.state.publisher.publish(event).await.unwrap();
    }
    assert!(app.consumer.shutdown(DRAIN).await);
    assert_eq!(store.rows(SysLoginLog::SCHEMA).len(), 2);

    let page = body_json(send(&app.router, get("/v1/sys-login-log?status=1")).await).await;
    assert_eq!(page["count"], 1);
    assert_eq!(page["list"][0]["username"], "mallory");
}
