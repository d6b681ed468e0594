//! Paginated list result returned by every list endpoint.

use serde::{Deserialize, Serialize};

use crate::condition::Pagination;

/// One page of results plus the total match count.
///
/// `count` is computed from the same predicate without limit/offset, so it
/// is independent of the page requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Rows on this page; never longer than `page_size`.
    pub list: Vec<T>,
    /// Total rows matching filters and permission.
    pub count: u64,
    /// 1-based page index.
    pub page_index: u64,
    /// Page size used.
    pub page_size: u64,
}

impl<T> Page<T> {
    /// Assemble a page.
    pub fn new(list: Vec<T>, count: u64, page: Pagination) -> Self {
        Self {
            list,
            count,
            page_index: page.index,
            page_size: page.size,
        }
    }

    /// A page with no rows and a zero count.
    pub fn empty(page: Pagination) -> Self {
        Self::new(Vec::new(), 0, page)
    }
}
