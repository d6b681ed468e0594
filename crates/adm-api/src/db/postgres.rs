//! PostgreSQL data source.
//!
//! A [`RestrictedQuery`] renders to one parameterised statement. Identifiers
//! come only from the resource [`Schema`] and are always quoted; every
//! literal is a bind parameter. Rows are fetched as `row_to_json` so the
//! engine needs no per-resource decoding code.

use adm_core::{LikePattern, Predicate, RestrictedQuery, Schema, Value};
use serde_json::Value as Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{storable, DataSource, DataSourceError, Row};

/// [`DataSource`] over a shared `PgPool`.
#[derive(Debug, Clone)]
pub struct PgDataSource {
    pool: PgPool,
}

impl PgDataSource {
    /// Wrap a connected pool; statements are built per call.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Int(v) => {
            qb.push_bind(*v);
        }
        Value::Text(v) => {
            qb.push_bind(v.clone());
        }
        Value::Bool(v) => {
            qb.push_bind(*v);
        }
        Value::Time(v) => {
            qb.push_bind(*v);
        }
    }
}

fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    match predicate {
        Predicate::True => {
            qb.push("TRUE");
        }
        Predicate::False => {
            qb.push("FALSE");
        }
        Predicate::Compare { column, op, value } => {
            qb.push(format!("t.{} {} ", quote(column), op.sql()));
            push_value(qb, value);
        }
        Predicate::Like { column, pattern, needle } => {
            let escaped = escape_like(needle);
            let pattern = match pattern {
                LikePattern::Contains => format!("%{escaped}%"),
                LikePattern::StartsWith => format!("{escaped}%"),
                LikePattern::EndsWith => format!("%{escaped}"),
            };
            qb.push(format!("t.{} LIKE ", quote(column)));
            qb.push_bind(pattern);
            qb.push(" ESCAPE '\\'");
        }
        Predicate::In { values, .. } if values.is_empty() => {
            qb.push("FALSE");
        }
        Predicate::In { column, values } => {
            qb.push(format!("t.{} IN (", quote(column)));
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, value);
            }
            qb.push(")");
        }
        Predicate::IsNull { column, negated } => {
            let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
            qb.push(format!("t.{} {test}", quote(column)));
        }
        Predicate::And(terms) => {
            qb.push("(");
            for (i, term) in terms.iter().enumerate() {
                if i > 0 {
                    qb.push(" AND ");
                }
                push_predicate(qb, term);
            }
            qb.push(")");
        }
    }
}

fn from_where(qb: &mut QueryBuilder<'_, Postgres>, plan: &RestrictedQuery) {
    qb.push(format!(" FROM {} AS t WHERE ", quote(plan.schema().table)));
    push_predicate(qb, &plan.predicate());
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

pub(crate) fn select_statement(plan: &RestrictedQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT row_to_json(t)");
    from_where(&mut qb, plan);

    qb.push(" ORDER BY ");
    for (i, sort) in plan.sort().iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        let direction = if sort.descending { "DESC" } else { "ASC" };
        qb.push(format!("t.{} {direction}", quote(sort.column)));
    }
    if let Some(limit) = plan.limit() {
        qb.push(" LIMIT ");
        qb.push_bind(to_i64(limit));
    }
    if let Some(offset) = plan.offset() {
        qb.push(" OFFSET ");
        qb.push_bind(to_i64(offset));
    }
    qb
}

pub(crate) fn count_statement(plan: &RestrictedQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*)");
    from_where(&mut qb, plan);
    qb
}

pub(crate) fn insert_statement(
    schema: &'static Schema,
    row: &Row,
) -> Option<QueryBuilder<'static, Postgres>> {
    let cells = storable(schema, row);
    if cells.is_empty() {
        return None;
    }
    let columns = cells
        .iter()
        .map(|(name, _)| quote(name))
        .collect::<Vec<_>>()
        .join(", ");
    let record: serde_json::Map<String, Json> =
        cells.into_iter().map(|(name, v)| (name.to_string(), v)).collect();

    let table = quote(schema.table);
    let mut qb = QueryBuilder::new(format!(
        "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, "
    ));
    qb.push_bind(Json::Object(record));
    qb.push(")");
    Some(qb)
}

#[async_trait::async_trait]
impl DataSource for PgDataSource {
    async fn find(&self, plan: &RestrictedQuery) -> Result<Vec<Row>, DataSourceError> {
        let rows: Vec<Json> = select_statement(plan)
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| match row {
                Json::Object(map) => Ok(map),
                other => Err(DataSourceError::Encoding(format!(
                    "expected a JSON object row, got {other}"
                ))),
            })
            .collect()
    }

    async fn count(&self, plan: &RestrictedQuery) -> Result<u64, DataSourceError> {
        let count: i64 = count_statement(plan)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn insert(&self, schema: &'static Schema, row: Row) -> Result<(), DataSourceError> {
        let Some(mut statement) = insert_statement(schema, &row) else {
            return Err(DataSourceError::Encoding(format!(
                "row for {} has no storable columns",
                schema.table
            )));
        };
        statement.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), DataSourceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
