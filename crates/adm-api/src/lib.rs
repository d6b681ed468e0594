//! # adm-api: Axum API Services for the Admin Stack
//!
//! Every list endpoint goes through the one generic action in
//! [`actions::index`]: bind the query string into a descriptor, build
//! filters and pagination, restrict by the caller's data scope, query the
//! [`DataSource`](db::DataSource), and return a
//! [`Page`](adm_core::Page). Side effects (operation logs, login logs, API
//! discovery) go through the in-process queue so request latency does not
//! depend on audit I/O.
//!
//! ## API Surface
//!
//! | Prefix        | Module            | Auth |
//! |---------------|-------------------|------|
//! | `/v1/*`       | [`routes`]        | yes  |
//! | `/health/*`   | this module       | no   |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! SetRequestId → Trace → PropagateRequestId → Principal → OperationLog → Handler
//! ```

pub mod actions;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod i18n;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

use axum::extract::State;
use axum::http::{HeaderName, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::extractors::REQUEST_ID_HEADER;
use crate::routes::ApiRoute;
use crate::state::AppState;

/// Assemble the application router.
///
/// Health probes are mounted outside the principal middleware so they
/// remain reachable without credentials.
pub fn app(state: AppState) -> Router {
    app_with_inventory(state).0
}

/// Assemble the router and return the inventory of its `/v1` routes.
pub fn app_with_inventory(state: AppState) -> (Router, Vec<ApiRoute>) {
    let (api, inventory) = routes::api().into_parts();
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let api = api
        .layer(from_fn_with_state(
            state.clone(),
            middleware::operation_log::operation_log,
        ))
        .layer(from_fn_with_state(state.clone(), auth::auth_middleware));

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    let router = Router::new()
        .merge(health)
        .merge(api)
        .with_state(state)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(middleware::tracing_layer::layer())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid));

    (router, inventory)
}

/// Liveness probe: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 when the data source answers.
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.data.ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(backend = state.data.backend(), error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "not ready")
        }
    }
}
