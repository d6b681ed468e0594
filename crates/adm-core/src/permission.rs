//! # Data Permission Scopes
//!
//! Each role carries a [`RolePolicy`]: a [`DataScope`] per table, with an
//! optional fallback. [`resolve`] turns the caller's scope for a resource
//! into a [`Predicate`] using only what is already in the [`Principal`]:
//! the department subtree is expanded once, when the principal is built,
//! from the configured [`OrgTree`].
//!
//! | Scope | Predicate |
//! |---------------------|---------------------------------------|
//! | `all`               | no restriction                        |
//! | `self`              | `owner_column = user_id`              |
//! | `dept`              | `org_column = dept_id`                |
//! | `dept_and_children` | `org_column IN (dept subtree)`        |
//! | `custom`            | `org_column IN (configured dept ids)` |
//! | *(undefined)*       | matches nothing                       |
//!
//! A scope that needs a column the resource does not have also matches
//! nothing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Deserialize;

use crate::query::{CompareOp, Predicate, Value};
use crate::resource::Schema;

/// Row visibility granted to a role for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum DataScope {
    /// Every row.
    All,
    /// Rows in an explicit list of departments.
    Custom {
        /// Department ids.
        dept_ids: Vec<i64>,
    },
    /// Rows in the caller's own department.
    Dept,
    /// Rows in the caller's department and every descendant department.
    DeptAndChildren,
    /// Rows created by the caller.
    #[serde(rename = "self")]
    SelfOnly,
}

/// Per-resource scopes for a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RolePolicy {
    /// Scope for tables not listed in `resources`.
    pub default: Option<DataScope>,
    /// Scope per table name.
    pub resources: HashMap<String, DataScope>,
}

impl RolePolicy {
    /// A policy granting every row of every resource.
    pub fn unrestricted() -> Self {
        Self {
            default: Some(DataScope::All),
            resources: HashMap::new(),
        }
    }

    /// Scope for a table, falling back to the default.
    pub fn scope_for(&self, table: &str) -> Option<&DataScope> {
        self.resources.get(table).or(self.default.as_ref())
    }
}

/// A department node as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Department {
    /// Department id.
    pub id: i64,
    /// Parent id; `0` or absent for roots.
    #[serde(default)]
    pub parent_id: i64,
}

/// Department hierarchy used to expand `dept_and_children`.
#[derive(Debug, Clone, Default)]
pub struct OrgTree {
    children: HashMap<i64, Vec<i64>>,
}

impl OrgTree {
    /// Build from a flat department list.
    pub fn new(departments: &[Department]) -> Self {
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for d in departments {
            if d.parent_id != d.id {
                children.entry(d.parent_id).or_default().push(d.id);
            }
        }
        Self { children }
    }

    /// `root` and all its descendants, breadth-first. Cycles are tolerated.
    pub fn subtree(&self, root: i64) -> Vec<i64> {
        let mut seen = HashSet::from([root]);
        let mut out = vec![root];
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            for &child in self.children.get(&id).map(Vec::as_slice).unwrap_or_default() {
                if seen.insert(child) {
                    out.push(child);
                    queue.push_back(child);
                }
            }
        }
        out
    }
}

/// The authenticated caller as seen by the query engine.
///
/// Built once per request and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Principal {
    /// User id, compared against owner columns.
    pub user_id: i64,
    /// Display name, recorded in audit events.
    pub username: String,
    /// Role key the policy was looked up under.
    pub role_key: String,
    /// Caller's department.
    pub dept_id: Option<i64>,
    /// Caller's department plus descendants; empty without a department.
    pub dept_subtree: Vec<i64>,
    /// Scopes for the caller's role.
    pub policy: Arc<RolePolicy>,
}

impl Principal {
    /// Construct a principal, expanding the department subtree from `tree`.
    pub fn new(
        user_id: i64,
        username: impl Into<String>,
        role_key: impl Into<String>,
        dept_id: Option<i64>,
        policy: Arc<RolePolicy>,
        tree: &OrgTree,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            role_key: role_key.into(),
            dept_id,
            dept_subtree: dept_id.map(|d| tree.subtree(d)).unwrap_or_default(),
            policy,
        }
    }
}

fn org_in(column: Option<&'static str>, ids: &[i64]) -> Predicate {
    match column {
        Some(column) => Predicate::In {
            column,
            values: ids.iter().copied().map(Value::Int).collect(),
        },
        None => Predicate::False,
    }
}

/// Resolve the permission predicate for `principal` on `schema`.
pub fn resolve(schema: &'static Schema, principal: &Principal) -> Predicate {
    let Some(scope) = principal.policy.scope_for(schema.table) else {
        tracing::debug!(
            table = schema.table,
            role = %principal.role_key,
            "no data scope defined; denying all rows"
        );
        return Predicate::False;
    };

    match scope {
        DataScope::All => Predicate::True,
        DataScope::SelfOnly => match schema.owner_column {
            Some(column) => Predicate::Compare {
                column,
                op: CompareOp::Eq,
                value: Value::Int(principal.user_id),
            },
            None => Predicate::False,
        },
        DataScope::Dept => match (schema.org_column, principal.dept_id) {
            (Some(column), Some(dept)) => Predicate::Compare {
                column,
                op: CompareOp::Eq,
                value: Value::Int(dept),
            },
            _ => Predicate::False,
        },
        DataScope::DeptAndChildren => org_in(schema.org_column, &principal.dept_subtree),
        DataScope::Custom { dept_ids } => org_in(schema.org_column, dept_ids),
    }
}
