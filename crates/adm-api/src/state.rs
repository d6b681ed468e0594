//! # Application State
//!
//! Shared state for the Axum application, passed to handlers and
//! middleware via the `State` extractor. Everything is behind `Arc` and
//! immutable after construction; the broker [`Publisher`] is injected here
//! rather than reached through a global.

use std::collections::HashMap;
use std::sync::Arc;

use adm_core::{OrgTree, Principal, RolePolicy};
use adm_queue::Publisher;

use crate::config::AppConfig;
use crate::db::DataSource;
use crate::models::AuditEvent;

/// Role key granted to legacy tokens and to every caller when
/// authentication is disabled.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub data: Arc<dyn DataSource>,
    pub publisher: Publisher<AuditEvent>,
    org: Arc<OrgTree>,
    policies: Arc<HashMap<String, Arc<RolePolicy>>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("data", &self.data.backend())
            .field("publisher", &self.publisher)
            .field("roles", &self.policies.len())
            .finish()
    }
}

impl AppState {
    pub fn new(config: AppConfig, data: Arc<dyn DataSource>, publisher: Publisher<AuditEvent>) -> Self {
        let org = OrgTree::new(&config.permission.departments);
        let policies = config
            .permission
            .roles
            .iter()
            .map(|(key, policy)| (key.clone(), Arc::new(policy.clone())))
            .collect();
        Self {
            config: Arc::new(config),
            data,
            publisher,
            org: Arc::new(org),
            policies: Arc::new(policies),
        }
    }

    /// Policy for a role key. The admin role is unrestricted unless
    /// configured otherwise; any other unconfigured role is unknown.
    pub fn policy_for(&self, role_key: &str) -> Option<Arc<RolePolicy>> {
        match self.policies.get(role_key) {
            Some(policy) => Some(Arc::clone(policy)),
            None if role_key == ADMIN_ROLE => Some(Arc::new(RolePolicy::unrestricted())),
            None => None,
        }
    }

    /// Build a principal, expanding its department subtree.
    pub fn principal(
        &self,
        user_id: i64,
        username: impl Into<String>,
        role_key: &str,
        dept_id: Option<i64>,
    ) -> Option<Principal> {
        let policy = self.policy_for(role_key)?;
        Some(Principal::new(user_id, username, role_key, dept_id, policy, &self.org))
    }

    /// The identity used for legacy tokens and when authentication is off.
    pub fn admin_principal(&self) -> Principal {
        let policy = self
            .policy_for(ADMIN_ROLE)
            .unwrap_or_else(|| Arc::new(RolePolicy::unrestricted()));
        Principal::new(1, ADMIN_ROLE, ADMIN_ROLE, None, policy, &self.org)
    }
}
