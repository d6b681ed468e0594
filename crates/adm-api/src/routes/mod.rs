//! # Route Table
//!
//! Routes are registered through [`RouteTable`], which records an
//! [`ApiRoute`] for each one as the router is built. The inventory is what
//! `--api` publishes on the `ApiCheck` topic.
//!
//! | Path                 | Resource        |
//! |----------------------|-----------------|
//! | `/v1/sys-user`       | [`SysUser`]     |
//! | `/v1/sys-role`       | [`SysRole`]     |
//! | `/v1/sys-login-log`  | [`SysLoginLog`] |
//! | `/v1/sys-opera-log`  | [`SysOperaLog`] |
//! | `/v1/sys-api`        | [`SysApi`]      |
//! | `/v1/sys-job`        | [`SysJob`]      |

use adm_core::{IndexRequest, QueryDescriptor, Resource};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::actions::index;
use crate::models::{SysApi, SysJob, SysLoginLog, SysOperaLog, SysRole, SysUser};
use crate::state::AppState;

/// One registered endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRoute {
    pub method: String,
    pub path: String,
    pub handler: String,
    pub title: String,
}

/// Router under construction plus its inventory.
pub struct RouteTable {
    router: Router<AppState>,
    inventory: Vec<ApiRoute>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            inventory: Vec::new(),
        }
    }

    /// `GET path` lists `R` through descriptor `D`.
    pub fn list_with<R: Resource, D: QueryDescriptor>(mut self, path: &str, title: &str) -> Self {
        self.router = self.router.route(path, get(index::<R, D>));
        self.inventory.push(ApiRoute {
            method: "GET".to_string(),
            path: path.to_string(),
            handler: format!("index<{}>", short_type_name::<R>()),
            title: title.to_string(),
        });
        self
    }

    /// `GET path` lists `R` with the default descriptor.
    pub fn list<R: Resource>(self, path: &str, title: &str) -> Self {
        self.list_with::<R, IndexRequest>(path, title)
    }

    pub fn into_parts(self) -> (Router<AppState>, Vec<ApiRoute>) {
        (self.router, self.inventory)
    }
}

/// Every `/v1` route.
pub fn api() -> RouteTable {
    RouteTable::new()
        .list::<SysUser>("/v1/sys-user", "User list")
        .list::<SysRole>("/v1/sys-role", "Role list")
        .list::<SysLoginLog>("/v1/sys-login-log", "Login log list")
        .list::<SysOperaLog>("/v1/sys-opera-log", "Operation log list")
        .list::<SysApi>("/v1/sys-api", "API list")
        .list::<SysJob>("/v1/sys-job", "Job list")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_matches_registered_routes() {
        let (_, inventory) = api().into_parts();
        let paths: Vec<&str> = inventory.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/v1/sys-user",
                "/v1/sys-role",
                "/v1/sys-login-log",
                "/v1/sys-opera-log",
                "/v1/sys-api",
                "/v1/sys-job"
            ]
        );
        assert_eq!(inventory[0].handler, "index<SysUser>");
        assert!(inventory.iter().all(|r| r.method == "GET"));
    }
}
