//! # Resource Capability
//!
//! A [`Resource`] is any entity served through the generic list action.
//! The engine only ever talks to it through two capabilities: a zero value
//! and a static [`Schema`]. Column names used in predicates and SQL are
//! always taken from the schema, never from client input.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Storage kind of a column; drives how filter values are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// 64-bit signed integer.
    Int,
    /// Free text.
    Text,
    /// Boolean.
    Bool,
    /// UTC timestamp.
    Time,
}

impl ColumnKind {
    /// Name used in validation messages.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Int => "an integer",
            Self::Text => "text",
            Self::Bool => "a boolean",
            Self::Time => "a timestamp",
        }
    }
}

/// A queryable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name as stored.
    pub name: &'static str,
    /// Storage kind.
    pub kind: ColumnKind,
}

impl Column {
    /// Integer column.
    pub const fn int(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Int }
    }

    /// Text column.
    pub const fn text(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Text }
    }

    /// Boolean column.
    pub const fn bool(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Bool }
    }

    /// Timestamp column.
    pub const fn time(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Time }
    }
}

/// Static description of a resource's storage.
#[derive(Debug)]
pub struct Schema {
    /// Table (or collection) name.
    pub table: &'static str,
    /// Primary key column; the default sort order.
    pub primary_key: &'static str,
    /// Every column clients may filter or sort on.
    pub columns: &'static [Column],
    /// Column holding the creating user's id, for owner-only scopes.
    pub owner_column: Option<&'static str>,
    /// Column holding the organisation (department) id, for department scopes.
    pub org_column: Option<&'static str>,
}

impl Schema {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// An entity exposed through the generic list action.
///
/// Rows travel between the data source and the engine as JSON objects keyed
/// by column name, so implementors deserialize from (and serialize to)
/// snake_case column names.
pub trait Resource: Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Storage description.
    const SCHEMA: &'static Schema;

    /// Storage identifier of this resource.
    fn table_name() -> &'static str {
        Self::SCHEMA.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SCHEMA: Schema = Schema {
        table: "widgets",
        primary_key: "id",
        columns: &[Column::int("id"), Column::text("name"), Column::time("created_at")],
        owner_column: None,
        org_column: None,
    };

    #[test]
    fn column_lookup_by_name() {
        assert_eq!(SCHEMA.column("name").map(|c| c.kind), Some(ColumnKind::Text));
        assert!(SCHEMA.column("missing").is_none());
    }

    #[test]
    fn kind_descriptions_are_readable() {
        assert_eq!(ColumnKind::Int.describe(), "an integer");
        assert_eq!(ColumnKind::Time.describe(), "a timestamp");
    }
}
