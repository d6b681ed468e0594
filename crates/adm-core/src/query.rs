//! # Predicates and Query Plans
//!
//! [`Predicate`] is the storage-neutral filter language. Postgres renders it
//! to SQL; the in-memory store evaluates it with [`Predicate::matches`]. Both
//! follow SQL semantics: a comparison against a missing or `NULL` value is
//! false, `LIKE`-style matches are case-sensitive, an empty `IN` list matches
//! nothing.
//!
//! A [`Query`] collects filters, ordering and pagination. It cannot be
//! executed until [`Query::restrict`] attaches a permission predicate and
//! turns it into a [`RestrictedQuery`], the only plan data sources accept.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::condition::Pagination;
use crate::resource::{ColumnKind, Schema};

/// A typed literal bound into a predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer literal.
    Int(i64),
    /// Text literal.
    Text(String),
    /// Boolean literal.
    Bool(bool),
    /// Timestamp literal.
    Time(DateTime<Utc>),
}

impl Value {
    /// Parse a raw client value as the given column kind.
    ///
    /// Timestamps accept RFC 3339, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`
    /// (all read as UTC). Booleans accept `true/false/1/0`.
    pub fn parse(kind: ColumnKind, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match kind {
            ColumnKind::Int => raw.parse().ok().map(Value::Int),
            ColumnKind::Text => Some(Value::Text(raw.to_string())),
            ColumnKind::Bool => match raw {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            ColumnKind::Time => parse_time(raw).map(Value::Time),
        }
    }

    /// Compare a stored JSON cell against this literal.
    ///
    /// `None` when the cell is null, missing, or of a different kind.
    fn compare_cell(&self, cell: &Json) -> Option<Ordering> {
        match self {
            Value::Int(v) => cell.as_i64().map(|c| c.cmp(v)),
            Value::Text(v) => cell.as_str().map(|c| c.cmp(v.as_str())),
            Value::Bool(v) => cell.as_bool().map(|c| c.cmp(v)),
            Value::Time(v) => cell.as_str().and_then(parse_time).map(|c| c.cmp(v)),
        }
    }
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl CompareOp {
    /// SQL spelling.
    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Gte => ord != Ordering::Less,
            Self::Lt => ord == Ordering::Less,
            Self::Lte => ord != Ordering::Greater,
        }
    }
}

/// Position of the needle in a `LIKE` match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikePattern {
    /// `%needle%`
    Contains,
    /// `needle%`
    StartsWith,
    /// `%needle`
    EndsWith,
}

/// Storage-neutral row filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    True,
    /// Matches no row.
    False,
    /// `column <op> value`
    Compare {
        /// Column name (from a [`Schema`]).
        column: &'static str,
        /// Operator.
        op: CompareOp,
        /// Literal.
        value: Value,
    },
    /// `column LIKE pattern`, case-sensitive.
    Like {
        /// Column name (from a [`Schema`]).
        column: &'static str,
        /// Needle position.
        pattern: LikePattern,
        /// Literal text, unescaped.
        needle: String,
    },
    /// `column IN (values)`; empty matches nothing.
    In {
        /// Column name (from a [`Schema`]).
        column: &'static str,
        /// Candidate literals.
        values: Vec<Value>,
    },
    /// `column IS NULL` (or `IS NOT NULL` when negated).
    IsNull {
        /// Column name (from a [`Schema`]).
        column: &'static str,
        /// `IS NOT NULL` when true.
        negated: bool,
    },
    /// Conjunction.
    And(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction with constant folding: `True` terms vanish, a `False`
    /// term collapses the whole conjunction, nested `And`s are flattened.
    pub fn and(terms: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut out = Vec::new();
        for term in terms {
            match term {
                Predicate::True => {}
                Predicate::False => return Predicate::False,
                Predicate::And(inner) => match Predicate::and(inner) {
                    Predicate::True => {}
                    Predicate::False => return Predicate::False,
                    Predicate::And(flat) => out.extend(flat),
                    other => out.push(other),
                },
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Predicate::True,
            1 => out.pop().unwrap_or(Predicate::True),
            _ => Predicate::And(out),
        }
    }

    /// Evaluate against a row keyed by column name.
    pub fn matches(&self, row: &Map<String, Json>) -> bool {
        match self {
            Predicate::True => true,
            Predicate::False => false,
            Predicate::Compare { column, op, value } => row
                .get(*column)
                .and_then(|cell| value.compare_cell(cell))
                .is_some_and(|ord| op.holds(ord)),
            Predicate::Like { column, pattern, needle } => row
                .get(*column)
                .and_then(Json::as_str)
                .is_some_and(|cell| match pattern {
                    LikePattern::Contains => cell.contains(needle.as_str()),
                    LikePattern::StartsWith => cell.starts_with(needle.as_str()),
                    LikePattern::EndsWith => cell.ends_with(needle.as_str()),
                }),
            Predicate::In { column, values } => row.get(*column).is_some_and(|cell| {
                values
                    .iter()
                    .any(|v| v.compare_cell(cell) == Some(Ordering::Equal))
            }),
            Predicate::IsNull { column, negated } => {
                let is_null = row.get(*column).map_or(true, Json::is_null);
                is_null != *negated
            }
            Predicate::And(terms) => terms.iter().all(|t| t.matches(row)),
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    /// Column name (from a [`Schema`]).
    pub column: &'static str,
    /// Descending when true.
    pub descending: bool,
}

/// A query plan under construction. Not executable on its own.
#[derive(Debug, Clone)]
pub struct Query {
    schema: &'static Schema,
    filters: Vec<Predicate>,
    sort: Vec<Sort>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    /// Start a plan over the given table.
    pub fn table(schema: &'static Schema) -> Self {
        Self {
            schema,
            filters: Vec::new(),
            sort: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// AND a filter into the plan.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Set the ordering.
    pub fn order_by(mut self, sort: Vec<Sort>) -> Self {
        self.sort = sort;
        self
    }

    /// Apply limit/offset from a normalised pagination.
    pub fn paginate(mut self, page: Pagination) -> Self {
        self.limit = Some(page.size);
        self.offset = Some(page.offset());
        self
    }

    /// Attach the caller's permission predicate, producing an executable plan.
    ///
    /// This is the only way to obtain a [`RestrictedQuery`]; internal callers
    /// that legitimately read everything pass [`Predicate::True`] explicitly.
    pub fn restrict(self, permission: Predicate) -> RestrictedQuery {
        RestrictedQuery {
            query: self,
            permission,
        }
    }
}

/// An executable query plan: filters, ordering, pagination and a mandatory
/// permission predicate.
#[derive(Debug, Clone)]
pub struct RestrictedQuery {
    query: Query,
    permission: Predicate,
}

impl RestrictedQuery {
    /// Target schema.
    pub fn schema(&self) -> &'static Schema {
        self.query.schema
    }

    /// Combined row predicate: every filter AND the permission predicate.
    pub fn predicate(&self) -> Predicate {
        Predicate::and(
            self.query
                .filters
                .iter()
                .cloned()
                .chain(std::iter::once(self.permission.clone())),
        )
    }

    /// The permission predicate alone.
    pub fn permission(&self) -> &Predicate {
        &self.permission
    }

    /// Ordering; falls back to primary key ascending so pages are stable.
    pub fn sort(&self) -> Vec<Sort> {
        if self.query.sort.is_empty() {
            vec![Sort {
                column: self.query.schema.primary_key,
                descending: false,
            }]
        } else {
            self.query.sort.clone()
        }
    }

    /// Row limit, if paginated.
    pub fn limit(&self) -> Option<u64> {
        self.query.limit
    }

    /// Row offset, if paginated.
    pub fn offset(&self) -> Option<u64> {
        self.query.offset
    }

    /// The same plan with limit and offset cleared, for total counts.
    pub fn unpaginated(&self) -> RestrictedQuery {
        let mut plan = self.clone();
        plan.query.limit = None;
        plan.query.offset = None;
        plan
    }
}
