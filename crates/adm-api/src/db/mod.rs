//! # Data Sources
//!
//! The dispatcher and the audit consumers talk to storage only through
//! [`DataSource`]. Two implementations:
//!
//! - [`PgDataSource`]: renders a [`RestrictedQuery`] to parameterised SQL.
//! - [`MemoryDataSource`]: evaluates the same plan over in-process rows.
//!   Used when no `database.url` is configured, and by the tests.
//!
//! Rows cross this boundary as JSON objects keyed by column name.

pub mod memory;
pub mod postgres;

use adm_core::{RestrictedQuery, Schema};
use serde_json::{Map, Value as Json};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use crate::config::DatabaseConfig;

pub use memory::MemoryDataSource;
pub use postgres::PgDataSource;

/// A stored row.
pub type Row = Map<String, Json>;

/// Storage failures.
#[derive(Error, Debug)]
pub enum DataSourceError {
    /// Nothing matched. List callers treat this as an empty result.
    #[error("record not found")]
    NotFound,

    /// The database rejected the statement or could not be reached.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A row could not be encoded for storage or decoded from it.
    #[error("row encoding error: {0}")]
    Encoding(String),
}

impl From<sqlx::Error> for DataSourceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::Database(other),
        }
    }
}

/// Storage seen by the engine.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Rows matching the plan, ordered and paginated.
    async fn find(&self, plan: &RestrictedQuery) -> Result<Vec<Row>, DataSourceError>;

    /// Number of rows matching the plan's predicate. Limit and offset are ignored.
    async fn count(&self, plan: &RestrictedQuery) -> Result<u64, DataSourceError>;

    /// Insert one row. Columns outside the schema are ignored; a missing
    /// primary key is assigned by the store.
    async fn insert(&self, schema: &'static Schema, row: Row) -> Result<(), DataSourceError>;

    /// Connectivity check for the readiness probe.
    async fn ping(&self) -> Result<(), DataSourceError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Initialize the PostgreSQL connection pool.
///
/// Returns `None` if no URL is configured (in-memory mode).
pub async fn init_pool(config: &DatabaseConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = config.url.as_deref() else {
        tracing::warn!(
            "database.url not set; running on the in-memory store. \
             Data will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");
    Ok(Some(pool))
}

/// Keep only schema columns with non-null values, in schema order.
pub(crate) fn storable(schema: &'static Schema, row: &Row) -> Vec<(&'static str, Json)> {
    schema
        .columns
        .iter()
        .filter_map(|c| match row.get(c.name) {
            Some(v) if !v.is_null() => Some((c.name, v.clone())),
            _ => None,
        })
        .collect()
}
