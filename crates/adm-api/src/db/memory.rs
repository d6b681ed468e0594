//! In-memory data source.
//!
//! Evaluates a [`RestrictedQuery`] directly with [`Predicate::matches`]
//! (via the plan's combined predicate), so it honours the same filter and
//! permission semantics as the SQL renderer.
//!
//! The lock is `parking_lot` and never held across an `.await`.

use std::cmp::Ordering;
use std::collections::HashMap;

use adm_core::{RestrictedQuery, Schema, Sort};
use parking_lot::RwLock;
use serde_json::Value as Json;

use super::{storable, DataSource, DataSourceError, Row};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

/// Thread-safe tables keyed by name.
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    tables: RwLock<HashMap<&'static str, Table>>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows synchronously. Test and bootstrap helper.
    pub fn seed(&self, schema: &'static Schema, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.tables.write();
        let table = tables.entry(schema.table).or_default();
        for row in rows {
            table.push(schema, row);
        }
    }

    /// Every row of a table in insertion order.
    pub fn rows(&self, schema: &'static Schema) -> Vec<Row> {
        self.tables
            .read()
            .get(schema.table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

impl Table {
    fn push(&mut self, schema: &'static Schema, row: Row) {
        let mut stored: Row = storable(schema, &row)
            .into_iter()
            .map(|(name, v)| (name.to_string(), v))
            .collect();

        let pk = schema.primary_key;
        match stored.get(pk).and_then(Json::as_i64) {
            Some(id) => self.next_id = self.next_id.max(id),
            None => {
                self.next_id += 1;
                stored.insert(pk.to_string(), Json::from(self.next_id));
            }
        }
        self.rows.push(stored);
    }
}

/// SQL-style ordering of two cells: values of the same kind compare
/// naturally, nulls (and missing cells) sort after everything else.
fn compare_cells(a: Option<&Json>, b: Option<&Json>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Json::Number(x)), Some(Json::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Json::String(x)), Some(Json::String(y))) => x.cmp(y),
        (Some(Json::Bool(x)), Some(Json::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn compare_rows(a: &Row, b: &Row, sort: &[Sort]) -> Ordering {
    for s in sort {
        let ord = compare_cells(a.get(s.column), b.get(s.column));
        let ord = if s.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait::async_trait]
impl DataSource for MemoryDataSource {
    async fn find(&self, plan: &RestrictedQuery) -> Result<Vec<Row>, DataSourceError> {
        let predicate = plan.predicate();
        let mut rows: Vec<Row> = {
            let tables = self.tables.read();
            match tables.get(plan.schema().table) {
                Some(table) => table
                    .rows
                    .iter()
                    .filter(|row| predicate.matches(row))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };

        let sort = plan.sort();
        rows.sort_by(|a, b| compare_rows(a, b, &sort));

        let offset = usize::try_from(plan.offset().unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = plan
            .limit()
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, plan: &RestrictedQuery) -> Result<u64, DataSourceError> {
        let predicate = plan.predicate();
        let tables = self.tables.read();
        let matched = tables
            .get(plan.schema().table)
            .map_or(0, |t| t.rows.iter().filter(|row| predicate.matches(row)).count());
        Ok(matched as u64)
    }

    async fn insert(&self, schema: &'static Schema, row: Row) -> Result<(), DataSourceError> {
        self.tables.write().entry(schema.table).or_default().push(schema, row);
        Ok(())
    }

    async fn ping(&self) -> Result<(), DataSourceError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
