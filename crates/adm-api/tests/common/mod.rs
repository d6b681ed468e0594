//! Shared helpers for the adm-api integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use adm_api::config::AppConfig;
use adm_api::db::{DataSource, MemoryDataSource, Row};
use adm_api::models::{consumers, AuditEvent};
use adm_api::state::AppState;
use adm_core::Resource;
use adm_queue::{BrokerBuilder, ConsumerHandle};
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const SECRET: &str = "s3cret";

pub struct TestApp {
    pub router: axum::Router,
    pub state: AppState,
    pub consumer: ConsumerHandle,
}

/// Build the app over `data`, with audit consumers writing to `data`.
pub fn build(config: AppConfig, data: Arc<dyn DataSource>) -> TestApp {
    let mut builder = BrokerBuilder::<AuditEvent>::new(config.queue.broker.clone());
    consumers::register(&mut builder, Arc::clone(&data));
    let (publisher, consumer) = builder.start();
    let state = AppState::new(config, data, publisher);
    TestApp {
        router: adm_api::app(state.clone()),
        state,
        consumer,
    }
}

/// Config with operation logging off, so list tests see only seeded rows.
pub fn quiet_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.logger.operation_log = false;
    config
}

/// Config with a token and the roles used across the tests.
pub fn secured_config() -> AppConfig {
    let yaml = format!(
        r#"
auth:
  token: {SECRET}
logger:
  operation_log: false
permission:
  roles:
    clerk:
      default: {{ scope: self }}
    manager:
      resources:
        sys_user: {{ scope: dept_and_children }}
    auditor:
      resources:
        sys_user: {{ scope: custom, dept_ids: [3, 4] }}
    guest: {{}}
  departments:
    - {{ id: 1 }}
    - {{ id: 2, parent_id: 1 }}
    - {{ id: 3, parent_id: 2 }}
    - {{ id: 4, parent_id: 1 }}
"#
    );
    serde_yaml::from_str(&yaml).unwrap()
}

pub fn row(value: serde_json::Value) -> Row {
    value.as_object().unwrap().clone()
}

/// `n` users, ids 1..=n, alternating owners 7/8 and departments 1..=4.
pub fn seed_users(store: &MemoryDataSource, n: i64) {
    let rows = (1..=n).map(|i| {
        row(serde_json::json!({
            "user_id": i,
            "username": format!("user{i:02}"),
            "status": if i % 5 == 0 { "1" } else { "2" },
            "create_by": if i % 2 == 0 { 8 } else { 7 },
            "dept_id": (i - 1) % 4 + 1,
            "created_at": format!("2024-01-{:02}T00:00:00Z", (i - 1) % 28 + 1),
        }))
    });
    store.seed(adm_api::models::SysUser::SCHEMA, rows);
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_as(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn send(router: &axum::Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Ids in a page's `list`, in order.
pub fn ids(page: &serde_json::Value, key: &str) -> Vec<i64> {
    page["list"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r[key].as_i64().unwrap())
        .collect()
}
