//! # Query Condition Builder
//!
//! Translates client list parameters into query modifications:
//!
//! - [`from_filters`] maps `(field, operator, value)` clauses onto
//!   [`Predicate`]s. Unknown fields are skipped silently, unknown operators
//!   are skipped with a warning, as are pattern operators (`contains`,
//!   `starts_with`, `ends_with`) on columns that do not hold text. Only
//!   values that cannot be parsed as the column's kind are rejected.
//! - [`paginate`] normalises page size and index; the size is clamped to a
//!   configured maximum so clients cannot request unbounded pages.
//! - [`sort_from`] keeps sort terms naming known columns.

use std::str::FromStr;

use serde::Deserialize;

use crate::error::ValidationError;
use crate::query::{CompareOp, LikePattern, Predicate, Sort, Value};
use crate::resource::{Column, ColumnKind, Schema};

/// Filter operators understood by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Exact match (the default when no operator is given).
    Eq,
    /// Not equal.
    Ne,
    /// Substring match.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Inclusive range, `lower,upper`.
    Between,
    /// Comma-separated set membership.
    In,
    /// `true` → IS NULL, `false` → IS NOT NULL.
    IsNull,
}

impl Operator {
    /// Substring-style operators, which only apply to text columns.
    pub fn is_pattern(self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "" | "eq" | "exact" => Self::Eq,
            "ne" => Self::Ne,
            "contains" => Self::Contains,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "between" => Self::Between,
            "in" => Self::In,
            "is_null" => Self::IsNull,
            _ => return Err(()),
        })
    }
}

/// A raw filter clause as received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    /// Field (column) name.
    pub field: String,
    /// Operator spelling; empty means equality.
    pub operator: String,
    /// Raw value.
    pub value: String,
}

impl FilterClause {
    /// Parse a query-string pair: `field=v` or `field[op]=v`.
    pub fn from_pair(key: &str, value: &str) -> Self {
        let (field, operator) = match key.strip_suffix(']').and_then(|k| k.split_once('[')) {
            Some((field, op)) => (field, op),
            None => (key, ""),
        };
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
        }
    }
}

/// Requested sort term, before column validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortClause {
    /// Field (column) name.
    pub field: String,
    /// Descending when true.
    pub descending: bool,
}

impl SortClause {
    /// Parse `a,-b` into terms.
    pub fn parse_list(raw: &str) -> Vec<SortClause> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('-') {
                Some(field) => SortClause {
                    field: field.to_string(),
                    descending: true,
                },
                None => SortClause {
                    field: s.trim_start_matches('+').to_string(),
                    descending: false,
                },
            })
            .collect()
    }
}

/// Pagination and filter bounds, from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageLimits {
    /// Page size used when the client sends none, or a non-positive one.
    pub default_page_size: u64,
    /// Hard upper bound on page size.
    pub max_page_size: u64,
    /// Upper bound on values in an `in` filter.
    pub max_in_values: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            max_in_values: 500,
        }
    }
}

/// Normalised pagination: both fields are always ≥ 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Rows per page.
    pub size: u64,
    /// 1-based page index.
    pub index: u64,
}

impl Pagination {
    /// Rows to skip: `(index - 1) * size`.
    pub fn offset(&self) -> u64 {
        self.index.saturating_sub(1).saturating_mul(self.size)
    }
}

/// Normalise client pagination.
///
/// Size ≤ 0 or absent → default; size above the maximum → maximum.
/// Index ≤ 0 or absent → 1.
pub fn paginate(size: Option<i64>, index: Option<i64>, limits: &PageLimits) -> Pagination {
    let max = limits.max_page_size.max(1);
    let size = match size {
        Some(s) if s > 0 => (s as u64).min(max),
        _ => limits.default_page_size.clamp(1, max),
    };
    let index = match index {
        Some(i) if i > 0 => i as u64,
        _ => 1,
    };
    Pagination { size, index }
}

/// Build the conjunction of all recognised filter clauses.
pub fn from_filters(
    schema: &'static Schema,
    clauses: &[FilterClause],
    limits: &PageLimits,
) -> Result<Predicate, ValidationError> {
    let mut terms = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let Some(column) = schema.column(&clause.field) else {
            tracing::debug!(table = schema.table, field = %clause.field, "ignoring filter on unknown field");
            continue;
        };
        let Ok(operator) = clause.operator.parse::<Operator>() else {
            tracing::warn!(
                table = schema.table,
                field = %clause.field,
                operator = %clause.operator,
                "ignoring filter with unrecognized operator"
            );
            continue;
        };
        if operator.is_pattern() && column.kind != ColumnKind::Text {
            tracing::warn!(
                table = schema.table,
                field = %clause.field,
                operator = %clause.operator,
                kind = column.kind.describe(),
                "ignoring pattern filter on a column that is not text"
            );
            continue;
        }
        terms.push(clause_predicate(column, operator, &clause.value, limits)?);
    }
    Ok(Predicate::and(terms))
}

fn literal(column: &Column, raw: &str) -> Result<Value, ValidationError> {
    Value::parse(column.kind, raw).ok_or_else(|| ValidationError::InvalidFilterValue {
        field: column.name.to_string(),
        expected: column.kind.describe(),
        value: raw.to_string(),
    })
}

fn clause_predicate(
    column: &'static Column,
    operator: Operator,
    raw: &str,
    limits: &PageLimits,
) -> Result<Predicate, ValidationError> {
    let compare = |op: CompareOp| -> Result<Predicate, ValidationError> {
        Ok(Predicate::Compare {
            column: column.name,
            op,
            value: literal(column, raw)?,
        })
    };
    let like = |pattern: LikePattern| Predicate::Like {
        column: column.name,
        pattern,
        needle: raw.to_string(),
    };

    match operator {
        Operator::Eq => compare(CompareOp::Eq),
        Operator::Ne => compare(CompareOp::Ne),
        Operator::Gt => compare(CompareOp::Gt),
        Operator::Gte => compare(CompareOp::Gte),
        Operator::Lt => compare(CompareOp::Lt),
        Operator::Lte => compare(CompareOp::Lte),
        Operator::Contains => Ok(like(LikePattern::Contains)),
        Operator::StartsWith => Ok(like(LikePattern::StartsWith)),
        Operator::EndsWith => Ok(like(LikePattern::EndsWith)),
        Operator::Between => {
            let Some((lower, upper)) = raw.split_once(',') else {
                return Err(ValidationError::InvalidRange {
                    field: column.name.to_string(),
                    value: raw.to_string(),
                });
            };
            Ok(Predicate::and(vec![
                Predicate::Compare {
                    column: column.name,
                    op: CompareOp::Gte,
                    value: literal(column, lower)?,
                },
                Predicate::Compare {
                    column: column.name,
                    op: CompareOp::Lte,
                    value: literal(column, upper)?,
                },
            ]))
        }
        Operator::In => {
            let parts: Vec<&str> = raw.split(',').filter(|s| !s.trim().is_empty()).collect();
            if parts.len() > limits.max_in_values {
                return Err(ValidationError::TooManyValues {
                    field: column.name.to_string(),
                    max: limits.max_in_values,
                    count: parts.len(),
                });
            }
            let values = parts
                .into_iter()
                .map(|p| literal(column, p))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Predicate::In {
                column: column.name,
                values,
            })
        }
        Operator::IsNull => match raw.trim() {
            "" | "true" | "1" => Ok(Predicate::IsNull {
                column: column.name,
                negated: false,
            }),
            "false" | "0" => Ok(Predicate::IsNull {
                column: column.name,
                negated: true,
            }),
            other => Err(ValidationError::InvalidFilterValue {
                field: column.name.to_string(),
                expected: "a boolean",
                value: other.to_string(),
            }),
        },
    }
}

/// Keep sort terms that name known columns.
pub fn sort_from(schema: &'static Schema, clauses: &[SortClause]) -> Vec<Sort> {
    clauses
        .iter()
        .filter_map(|c| {
            schema.column(&c.field).map(|col| Sort {
                column: col.name,
                descending: c.descending,
            })
        })
        .collect()
}
