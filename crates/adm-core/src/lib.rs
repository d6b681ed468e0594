//! # adm-core: Query Engine for the Admin Stack
//!
//! Pure, I/O-free building blocks shared by every list endpoint:
//!
//! 1. **[`Resource`]**: the capability every exposed entity implements, a
//!    zero value (`Default`) and a static [`Schema`] naming its table, its
//!    columns and the columns that carry ownership.
//!
//! 2. **[`Predicate`] / [`Query`]**: a small predicate language that the
//!    data sources render (SQL for Postgres, direct evaluation for the
//!    in-memory store). A [`Query`] only becomes executable as a
//!    [`RestrictedQuery`], which requires a permission predicate.
//!
//! 3. **[`condition`]**: turns client filter clauses into predicates and
//!    normalises pagination.
//!
//! 4. **[`permission`]**: resolves a [`Principal`]'s data scope for a
//!    resource into a predicate, without touching storage.
//!
//! No `.unwrap()` outside tests. Errors are [`ValidationError`] only: this
//! crate never sees infrastructure failures.

pub mod condition;
pub mod descriptor;
pub mod error;
pub mod page;
pub mod permission;
pub mod query;
pub mod resource;

pub use condition::{from_filters, paginate, sort_from, FilterClause, Operator, PageLimits, Pagination, SortClause};
pub use descriptor::{IndexRequest, QueryDescriptor};
pub use error::ValidationError;
pub use page::Page;
pub use permission::{resolve, DataScope, Department, OrgTree, Principal, RolePolicy};
pub use query::{CompareOp, LikePattern, Predicate, Query, RestrictedQuery, Sort, Value};
pub use resource::{Column, ColumnKind, Resource, Schema};
