//! # Validation Errors
//!
//! The only failure the query engine reports: a client sent list parameters
//! that cannot be interpreted. Everything else (unknown fields, unknown
//! operators, out-of-range pagination) is normalised or ignored.

use thiserror::Error;

/// Malformed list-request input. Surfaces to clients as HTTP 422.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A pagination parameter is not an integer.
    #[error("parameter `{name}` must be an integer, got `{value}`")]
    InvalidInteger {
        /// Query-string parameter name.
        name: String,
        /// Raw value supplied by the client.
        value: String,
    },

    /// A filter value cannot be parsed as the column's kind.
    #[error("filter on `{field}` expects {expected}, got `{value}`")]
    InvalidFilterValue {
        /// Column name.
        field: String,
        /// Human-readable kind ("integer", "timestamp", ...).
        expected: &'static str,
        /// Raw value supplied by the client.
        value: String,
    },

    /// `between` requires exactly two comma-separated bounds.
    #[error("filter `{field}[between]` expects two comma-separated bounds, got `{value}`")]
    InvalidRange {
        /// Column name.
        field: String,
        /// Raw value supplied by the client.
        value: String,
    },

    /// An `in` filter lists more values than allowed.
    #[error("filter `{field}[in]` accepts at most {max} values, got {count}")]
    TooManyValues {
        /// Column name.
        field: String,
        /// Configured maximum.
        max: usize,
        /// Number of values supplied.
        count: usize,
    },
}
