//! End-to-end tests for the generic list action, driven through the full
//! router with `tower::ServiceExt::oneshot`.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use adm_api::config::AppConfig;
use adm_api::db::{DataSource, DataSourceError, MemoryDataSource, Row};
use adm_api::models::{SysOperaLog, SysUser};
use adm_core::{Resource, RestrictedQuery, Schema};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use proptest::prelude::*;
use tracing_subscriber::layer::SubscriberExt;

use common::*;

fn seeded(n: i64) -> Arc<MemoryDataSource> {
    let store = Arc::new(MemoryDataSource::new());
    seed_users(&store, n);
    store
}

// -- Pagination ----------------------------------------------------------

#[tokio::test]
async fn second_page_of_twenty_five_rows() {
    let app = build(quiet_config(), seeded(25));

    let response = send(&app.router, get("/v1/sys-user?pageSize=10&pageIndex=2")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;

    assert_eq!(page["count"], 25);
    assert_eq!(page["pageIndex"], 2);
    assert_eq!(page["pageSize"], 10);
    assert_eq!(ids(&page, "user_id"), (11..=20).collect::<Vec<_>>());
}

#[tokio::test]
async fn last_partial_page_and_page_past_the_end() {
    let app = build(quiet_config(), seeded(25));

    let page = body_json(send(&app.router, get("/v1/sys-user?pageSize=10&pageIndex=3")).await).await;
    assert_eq!(ids(&page, "user_id"), (21..=25).collect::<Vec<_>>());

    let page = body_json(send(&app.router, get("/v1/sys-user?pageSize=10&pageIndex=9")).await).await;
    assert!(page["list"].as_array().unwrap().is_empty());
    assert_eq!(page["count"], 25);
}

#[tokio::test]
async fn non_positive_page_size_falls_back_to_default() {
    let app = build(quiet_config(), seeded(25));

    let page = body_json(send(&app.router, get("/v1/sys-user?pageSize=-5&pageIndex=0")).await).await;
    assert_eq!(page["pageSize"], 10);
    assert_eq!(page["pageIndex"], 1);
    assert_eq!(page["list"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn oversized_page_is_clamped() {
    let mut config = quiet_config();
    config.query.max_page_size = 20;
    let app = build(config, seeded(25));

    let page = body_json(send(&app.router, get("/v1/sys-user?pageSize=1000")).await).await;
    assert_eq!(page["pageSize"], 20);
    assert_eq!(page["list"].as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn empty_table_returns_empty_page() {
    let app = build(quiet_config(), Arc::new(MemoryDataSource::new()));

    let response = send(&app.router, get("/v1/sys-role")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["count"], 0);
    assert_eq!(page["list"], serde_json::json!([]));
}

// -- Filters and sorting -------------------------------------------------

#[tokio::test]
async fn filters_and_sort_apply_to_list_and_count() {
    let app = build(quiet_config(), seeded(25));

    // status "1" on every fifth user.
    let page = body_json(send(&app.router, get("/v1/sys-user?status=1&sort=-user_id")).await).await;
    assert_eq!(page["count"], 5);
    assert_eq!(ids(&page, "user_id"), vec![25, 20, 15, 10, 5]);

    let page = body_json(
        send(&app.router, get("/v1/sys-user?username%5Bstarts_with%5D=user1&pageSize=3")).await,
    )
    .await;
    assert_eq!(page["count"], 10);
    assert_eq!(ids(&page, "user_id"), vec![10, 11, 12]);
}

#[tokio::test]
async fn unknown_operator_and_field_are_ignored() {
    let app = build(quiet_config(), seeded(25));

    let response = send(
        &app.router,
        get("/v1/sys-user?username%5Bregex%5D=.*&no_such_field=1&sort=bogus"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["count"], 25);
    assert_eq!(ids(&page, "user_id"), (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn pattern_filter_on_numeric_column_is_ignored() {
    let store = Arc::new(MemoryDataSource::new());
    store.seed(
        SysOperaLog::SCHEMA,
        [200, 404, 500].into_iter().enumerate().map(|(i, status)| {
            row(serde_json::json!({
                "opera_id": i as i64 + 1,
                "request_method": "GET",
                "oper_url": "/v1/sys-user",
                "status": status,
            }))
        }),
    );
    let app = build(quiet_config(), store);

    let response = send(&app.router, get("/v1/sys-opera-log?status%5Bcontains%5D=20")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["count"], 3);

    let page = body_json(
        send(&app.router, get("/v1/sys-opera-log?status%5Bstarts_with%5D=4&status=500")).await,
    )
    .await;
    assert_eq!(ids(&page, "opera_id"), vec![3]);
}

// -- Validation ----------------------------------------------------------

#[tokio::test]
async fn non_numeric_page_size_is_a_localized_validation_error() {
    let app = build(quiet_config(), seeded(3));

    let response = send(&app.router, get("/v1/sys-user?pageSize=abc")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["message"], "Parameter validation failed");
    assert_eq!(body["requestId"].as_str().map(str::to_owned), request_id);

    let request = Request::builder()
        .uri("/v1/sys-user?pageSize=abc")
        .header("accept-language", "zh-CN,zh;q=0.9,en;q=0.8")
        .body(Body::empty())
        .unwrap();
    let body = body_json(send(&app.router, request).await).await;
    assert_eq!(body["message"], "参数验证失败");
}

#[tokio::test]
async fn filter_value_of_wrong_kind_is_rejected() {
    let app = build(quiet_config(), seeded(3));

    let response = send(&app.router, get("/v1/sys-user?user_id=abc")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn client_request_id_is_echoed() {
    let app = build(quiet_config(), seeded(3));

    let request = Request::builder()
        .uri("/v1/sys-user?pageSize=abc")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;
    assert_eq!(response.headers()["x-request-id"], "req-42");
    assert_eq!(body_json(response).await["requestId"], "req-42");
}

// -- Data source failures ------------------------------------------------

#[derive(Clone, Copy)]
enum Failure {
    CountNotFound,
    FindBroken,
}

struct FlakySource {
    inner: MemoryDataSource,
    failure: Failure,
}

#[async_trait::async_trait]
impl DataSource for FlakySource {
    async fn find(&self, plan: &RestrictedQuery) -> Result<Vec<Row>, DataSourceError> {
        match self.failure {
            Failure::FindBroken => Err(DataSourceError::Encoding(
                "connection reset by peer at 10.1.2.3".into(),
            )),
            Failure::CountNotFound => self.inner.find(plan).await,
        }
    }

    async fn count(&self, plan: &RestrictedQuery) -> Result<u64, DataSourceError> {
        match self.failure {
            Failure::CountNotFound => Err(DataSourceError::NotFound),
            Failure::FindBroken => self.inner.count(plan).await,
        }
    }

    async fn insert(&self, schema: &'static Schema, row: Row) -> Result<(), DataSourceError> {
        self.inner.insert(schema, row).await
    }

    async fn ping(&self) -> Result<(), DataSourceError> {
        Err(DataSourceError::Encoding("down".into()))
    }

    fn backend(&self) -> &'static str {
        "flaky"
    }
}

fn flaky(failure: Failure) -> Arc<FlakySource> {
    let inner = MemoryDataSource::new();
    seed_users(&inner, 4);
    Arc::new(FlakySource { inner, failure })
}

#[tokio::test]
async fn not_found_on_count_reports_zero() {
    let app = build(quiet_config(), flaky(Failure::CountNotFound));

    let response = send(&app.router, get("/v1/sys-user")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["count"], 0);
    assert_eq!(page["list"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn data_source_error_is_a_generic_query_failure() {
    let app = build(quiet_config(), flaky(Failure::FindBroken));

    let response = send(&app.router, get("/v1/sys-user")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_string(response).await;
    assert!(!body.contains("10.1.2.3"), "internal detail leaked: {body}");

    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["code"], "QUERY_FAILED");
    assert_eq!(body["message"], "Query failed");
    assert!(body["requestId"].is_string());
    assert!(body.get("details").is_none());
}

/// Counts ERROR events emitted by this crate.
#[derive(Clone, Default)]
struct AppErrors(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for AppErrors {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == tracing::Level::ERROR && meta.target().starts_with("adm_api") {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn query_failure_is_logged_once() {
    let errors = AppErrors::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(errors.clone()));
    let app = build(quiet_config(), flaky(Failure::FindBroken));

    let response = send(&app.router, get("/v1/sys-user")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(errors.0.load(Ordering::SeqCst), 1);
}

// -- Authentication and data scope ---------------------------------------

#[tokio::test]
async fn missing_or_wrong_token_is_unauthorized() {
    let app = build(secured_config(), seeded(4));

    let response = send(&app.router, get("/v1/sys-user")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");

    let response = send(&app.router, get_as("/v1/sys-user", "wrong")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app.router, get_as("/v1/sys-user", &format!("nobody:3::{SECRET}"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn legacy_token_sees_everything() {
    let app = build(secured_config(), seeded(12));

    let page = body_json(send(&app.router, get_as("/v1/sys-user", SECRET)).await).await;
    assert_eq!(page["count"], 12);
}

#[tokio::test]
async fn self_scope_limits_rows_to_the_owner() {
    let app = build(secured_config(), seeded(12));

    let token = format!("clerk:7::{SECRET}");
    let page = body_json(send(&app.router, get_as("/v1/sys-user?pageSize=100", &token)).await).await;
    assert_eq!(page["count"], 6);
    assert!(page["list"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["create_by"] == 7));
}

#[tokio::test]
async fn dept_and_children_scope_follows_the_tree() {
    let app = build(secured_config(), seeded(12));

    // dept 2 has child 3; users cycle through depts 1..=4.
    let token = format!("manager:5:2:{SECRET}");
    let page = body_json(send(&app.router, get_as("/v1/sys-user?pageSize=100", &token)).await).await;
    assert_eq!(page["count"], 6);
    let mut depts: Vec<i64> = page["list"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["dept_id"].as_i64().unwrap())
        .collect();
    depts.sort_unstable();
    depts.dedup();
    assert_eq!(depts, vec![2, 3]);
}

#[tokio::test]
async fn custom_scope_uses_configured_departments() {
    let app = build(secured_config(), seeded(8));

    let token = format!("auditor:5:1:{SECRET}");
    let page = body_json(send(&app.router, get_as("/v1/sys-user", &token)).await).await;
    assert_eq!(ids(&page, "user_id"), vec![3, 4, 7, 8]);
}

#[tokio::test]
async fn undefined_scope_denies_all_rows() {
    let app = build(secured_config(), seeded(8));

    // guest has no scopes; manager has none for sys_role.
    let guest = format!("guest:5:1:{SECRET}");
    let response = send(&app.router, get_as("/v1/sys-user", &guest)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["count"], 0);
    assert_eq!(page["list"], serde_json::json!([]));

    let manager = format!("manager:5:2:{SECRET}");
    let page = body_json(send(&app.router, get_as("/v1/sys-role", &manager)).await).await;
    assert_eq!(page["count"], 0);
}

#[tokio::test]
async fn filters_cannot_widen_the_data_scope() {
    let app = build(secured_config(), seeded(12));

    let token = format!("clerk:7::{SECRET}");
    let page = body_json(send(&app.router, get_as("/v1/sys-user?create_by=8", &token)).await).await;
    assert_eq!(page["count"], 0);
}

// -- Health --------------------------------------------------------------

#[tokio::test]
async fn health_probes_need_no_credentials() {
    let app = build(secured_config(), seeded(1));

    let response = send(&app.router, get("/health/liveness")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");

    let response = send(&app.router, get("/health/readiness")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ready");
}

#[tokio::test]
async fn readiness_fails_when_the_data_source_is_down() {
    let app = build(quiet_config(), flaky(Failure::CountNotFound));

    let response = send(&app.router, get("/health/readiness")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// -- Properties ----------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn page_never_exceeds_size_and_count_ignores_pagination(
        rows in 0i64..40,
        size in -3i64..15,
        index in -1i64..6,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (list_len, count, page_size) = runtime.block_on(async {
            let app = build(quiet_config(), seeded(rows));
            let uri = format!("/v1/sys-user?pageSize={size}&pageIndex={index}");
            let page = body_json(send(&app.router, get(&uri)).await).await;
            (
                page["list"].as_array().unwrap().len() as u64,
                page["count"].as_u64().unwrap(),
                page["pageSize"].as_u64().unwrap(),
            )
        });
        prop_assert!(list_len <= page_size);
        prop_assert_eq!(count, rows as u64);
    }
}

// -- Scoped filtering against an oracle ----------------------------------

/// One role per data scope over the departments tree 1 -> {2 -> 3, 4}.
fn scoped_config() -> AppConfig {
    let yaml = format!(
        r#"
auth:
  token: {SECRET}
logger:
  operation_log: false
permission:
  roles:
    everyone:
      default: {{ scope: all }}
    own:
      default: {{ scope: self }}
    unit:
      default: {{ scope: dept }}
    branch:
      default: {{ scope: dept_and_children }}
    picked:
      default: {{ scope: custom, dept_ids: [2, 4] }}
  departments:
    - {{ id: 1 }}
    - {{ id: 2, parent_id: 1 }}
    - {{ id: 3, parent_id: 2 }}
    - {{ id: 4, parent_id: 1 }}
"#
    );
    serde_yaml::from_str(&yaml).unwrap()
}

const ROLES: [&str; 5] = ["everyone", "own", "unit", "branch", "picked"];

#[derive(Debug, Clone)]
struct UserRow {
    id: i64,
    owner: i64,
    dept: i64,
    status: &'static str,
}

impl UserRow {
    fn username(&self) -> String {
        format!("user{:02}", self.id)
    }

    fn visible_to(&self, role: &str, user_id: i64, dept_id: i64) -> bool {
        match role {
            "everyone" => true,
            "own" => self.owner == user_id,
            "unit" => self.dept == dept_id,
            "branch" => match dept_id {
                1 => true,
                2 => matches!(self.dept, 2 | 3),
                other => self.dept == other,
            },
            "picked" => matches!(self.dept, 2 | 4),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
enum Filter {
    None,
    Status(&'static str),
    Dept(i64),
    Owner(i64),
    UsernameContains(u8),
    IdAtLeast(i64),
}

impl Filter {
    fn query(&self) -> String {
        match self {
            Filter::None => String::new(),
            Filter::Status(s) => format!("&status={s}"),
            Filter::Dept(d) => format!("&dept_id={d}"),
            Filter::Owner(o) => format!("&create_by={o}"),
            Filter::UsernameContains(digit) => format!("&username%5Bcontains%5D={digit}"),
            Filter::IdAtLeast(n) => format!("&user_id%5Bgte%5D={n}"),
        }
    }

    fn matches(&self, row: &UserRow) -> bool {
        match self {
            Filter::None => true,
            Filter::Status(s) => row.status == *s,
            Filter::Dept(d) => row.dept == *d,
            Filter::Owner(o) => row.owner == *o,
            Filter::UsernameContains(digit) => row.username().contains(&digit.to_string()),
            Filter::IdAtLeast(n) => row.id >= *n,
        }
    }
}

fn user_rows() -> impl Strategy<Value = Vec<UserRow>> {
    prop::collection::vec((7i64..=9, 1i64..=4, prop::bool::ANY), 0..30).prop_map(|cells| {
        cells
            .into_iter()
            .enumerate()
            .map(|(i, (owner, dept, active))| UserRow {
                id: i as i64 + 1,
                owner,
                dept,
                status: if active { "2" } else { "1" },
            })
            .collect()
    })
}

fn filters() -> impl Strategy<Value = Filter> {
    prop_oneof![
        Just(Filter::None),
        prop::sample::select(vec!["1", "2"]).prop_map(Filter::Status),
        (1i64..=4).prop_map(Filter::Dept),
        (7i64..=9).prop_map(Filter::Owner),
        (0u8..=9).prop_map(Filter::UsernameContains),
        (1i64..=30).prop_map(Filter::IdAtLeast),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn scoped_results_match_filter_and_scope(
        rows in user_rows(),
        role in prop::sample::select(ROLES.to_vec()),
        user_id in 7i64..=9,
        dept_id in 1i64..=4,
        filter in filters(),
    ) {
        let store = Arc::new(MemoryDataSource::new());
        store.seed(
            SysUser::SCHEMA,
            rows.iter().map(|r| {
                row(serde_json::json!({
                    "user_id": r.id,
                    "username": r.username(),
                    "status": r.status,
                    "create_by": r.owner,
                    "dept_id": r.dept,
                }))
            }),
        );
        let expected: Vec<i64> = rows
            .iter()
            .filter(|r| filter.matches(r) && r.visible_to(role, user_id, dept_id))
            .map(|r| r.id)
            .collect();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (status, page) = runtime.block_on(async {
            let app = build(scoped_config(), store);
            let uri = format!("/v1/sys-user?pageSize=100{}", filter.query());
            let token = format!("{role}:{user_id}:{dept_id}:{SECRET}");
            let response = send(&app.router, get_as(&uri, &token)).await;
            (response.status(), body_json(response).await)
        });

        prop_assert_eq!(status, StatusCode::OK);
        prop_assert_eq!(page["count"].as_u64().unwrap(), expected.len() as u64);
        let returned = ids(&page, "user_id");
        for id in &returned {
            let r = &rows[(*id - 1) as usize];
            prop_assert!(filter.matches(r), "row {} escapes filter {:?}", id, filter);
            prop_assert!(r.visible_to(role, user_id, dept_id), "row {} escapes {} scope", id, role);
        }
        prop_assert_eq!(returned, expected);
    }
}
