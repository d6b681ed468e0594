//! Generic list action.
//!
//! One handler serves every list endpoint, monomorphised per resource and
//! descriptor at the route:
//!
//! ```ignore
//! .route("/v1/sys-user", get(index::<SysUser, IndexRequest>))
//! ```
//!
//! Composition order is fixed: filters, then pagination, then the caller's
//! permission predicate. The data source only accepts the
//! [`RestrictedQuery`](adm_core::RestrictedQuery) the last step produces.

use adm_core::{from_filters, resolve, sort_from, Page, Query, QueryDescriptor, Resource};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query as QueryString, State};
use axum::Json;

use crate::db::{DataSourceError, Row};
use crate::error::{AppError, ErrorResponse};
use crate::extractors::{Caller, RequestContext};
use crate::state::AppState;

type Params = Vec<(String, String)>;

fn decode<R: Resource>(rows: Vec<Row>) -> Result<Vec<R>, serde_json::Error> {
    rows.into_iter()
        .map(|row| serde_json::from_value(serde_json::Value::Object(row)))
        .collect()
}

/// Logged once, with the request id, when the response is rendered.
fn query_failed(table: &str, stage: &str, err: impl std::fmt::Display, ctx: &RequestContext) -> ErrorResponse {
    AppError::QueryFailed(format!("{table} {stage}: {err}")).in_context(ctx)
}

/// List `R` with filters bound through `D`, restricted to what the caller may see.
pub async fn index<R: Resource, D: QueryDescriptor>(
    State(state): State<AppState>,
    ctx: RequestContext,
    Caller(principal): Caller,
    params: Result<QueryString<Params>, QueryRejection>,
) -> Result<Json<Page<R>>, ErrorResponse> {
    let QueryString(params) =
        params.map_err(|e| AppError::BadRequest(e.body_text()).in_context(&ctx))?;
    let limits = &state.config.query;
    let schema = R::SCHEMA;

    let mut descriptor = D::default();
    descriptor
        .bind(&params, limits)
        .map_err(|e| AppError::from(e).in_context(&ctx))?;
    let filters = from_filters(schema, descriptor.filters(), limits)
        .map_err(|e| AppError::from(e).in_context(&ctx))?;
    let page = descriptor.pagination();

    let plan = Query::table(schema)
        .filter(filters)
        .order_by(sort_from(schema, descriptor.sort()))
        .paginate(page)
        .restrict(resolve(schema, &principal));

    let rows = match state.data.find(&plan).await {
        Ok(rows) => rows,
        Err(DataSourceError::NotFound) => Vec::new(),
        Err(e) => return Err(query_failed(schema.table, "find", e, &ctx)),
    };
    let count = match state.data.count(&plan.unpaginated()).await {
        Ok(count) => count,
        Err(DataSourceError::NotFound) => 0,
        Err(e) => return Err(query_failed(schema.table, "count", e, &ctx)),
    };

    let list = decode::<R>(rows).map_err(|e| query_failed(schema.table, "decode", e, &ctx))?;
    Ok(Json(Page::new(list, count, page)))
}
