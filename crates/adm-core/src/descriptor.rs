//! # Query Descriptors
//!
//! A descriptor is the typed form of a list request. The dispatcher creates
//! a fresh `D::default()` per request and binds it from the raw query-string
//! pairs; binding is where malformed pagination is rejected.
//!
//! [`IndexRequest`] is the general-purpose descriptor: reserved keys
//! `pageSize`, `pageIndex` and `sort`, every other key is a filter clause.

use crate::condition::{paginate, FilterClause, PageLimits, Pagination, SortClause};
use crate::error::ValidationError;

/// Typed list request bound from query parameters.
pub trait QueryDescriptor: Default + Send + 'static {
    /// Populate from raw `(key, value)` pairs.
    fn bind(&mut self, params: &[(String, String)], limits: &PageLimits) -> Result<(), ValidationError>;

    /// Normalised pagination.
    fn pagination(&self) -> Pagination;

    /// Filter clauses to search on.
    fn filters(&self) -> &[FilterClause];

    /// Requested ordering.
    fn sort(&self) -> &[SortClause];
}

/// Default descriptor accepting any filter the target schema knows about.
#[derive(Debug, Clone, Default)]
pub struct IndexRequest {
    page: Option<Pagination>,
    filters: Vec<FilterClause>,
    sort: Vec<SortClause>,
}

fn integer(name: &str, raw: &str) -> Result<Option<i64>, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(|_| ValidationError::InvalidInteger {
        name: name.to_string(),
        value: raw.to_string(),
    })
}

impl QueryDescriptor for IndexRequest {
    fn bind(&mut self, params: &[(String, String)], limits: &PageLimits) -> Result<(), ValidationError> {
        let mut size = None;
        let mut index = None;
        for (key, value) in params {
            match key.as_str() {
                "pageSize" => size = integer(key, value)?,
                "pageIndex" => index = integer(key, value)?,
                "sort" => self.sort.extend(SortClause::parse_list(value)),
                _ => self.filters.push(FilterClause::from_pair(key, value)),
            }
        }
        self.page = Some(paginate(size, index, limits));
        Ok(())
    }

    fn pagination(&self) -> Pagination {
        self.page
            .unwrap_or_else(|| paginate(None, None, &PageLimits::default()))
    }

    fn filters(&self) -> &[FilterClause] {
        &self.filters
    }

    fn sort(&self) -> &[SortClause] {
        &self.sort
    }
}
