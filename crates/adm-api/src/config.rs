//! # Configuration
//!
//! One YAML file, loaded once at startup. Every section is optional and
//! falls back to its defaults; the file itself is not. After parsing, three
//! environment variables override their settings:
//!
//! | Variable       | Setting          |
//! |----------------|------------------|
//! | `DATABASE_URL` | `database.url`   |
//! | `PORT`         | `application.port` |
//! | `AUTH_TOKEN`   | `auth.token`     |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use adm_core::{Department, PageLimits, RolePolicy};
use adm_queue::QueueConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::i18n::Locale;
use crate::jobs::JobConfig;

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("environment variable {name} has invalid value `{value}`")]
    Env { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root of the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub application: ApplicationConfig,
    pub ssl: SslConfig,
    pub database: DatabaseConfig,
    pub query: PageLimits,
    pub queue: QueueSettings,
    pub logger: LoggerConfig,
    pub auth: AuthConfig,
    pub permission: PermissionConfig,
    pub server: ServerConfig,
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// `dev`, `test` or `prod`; only reported in the banner.
    pub mode: String,
    /// Default response language.
    pub locale: Locale,
    /// Reported in the banner. Timestamps are always stored in UTC.
    pub timezone: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "adm".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            mode: "dev".to_string(),
            locale: Locale::En,
            timezone: "UTC".to_string(),
        }
    }
}

/// TLS termination.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    pub enable: bool,
    /// PEM certificate chain.
    pub cert: Option<PathBuf>,
    /// PEM private key.
    pub key: Option<PathBuf>,
}

/// Postgres connection. Without a URL the server runs on the in-memory store.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            acquire_timeout_secs: 5,
        }
    }
}

// The URL usually embeds a password.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

/// What the request path does when an audit event cannot be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishFailurePolicy {
    /// Log a warning; the response is unaffected.
    #[default]
    LogAndContinue,
    /// Replace the response with a 500.
    FailRequest,
}

/// Broker settings plus the request-side publish policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    #[serde(flatten)]
    pub broker: QueueConfig,
    pub publish_failure: PublishFailurePolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
    /// Publish an operation-log event per request.
    pub operation_log: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            operation_log: true,
        }
    }
}

/// Pre-shared bearer secret. `None` disables authentication.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Data scopes per role and the department tree they are resolved against.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    pub roles: HashMap<String, RolePolicy>,
    pub departments: Vec<Department>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// How long in-flight requests get to finish after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 5,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl AppConfig {
    /// Read, parse, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse only.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(port) = lookup("PORT") {
            self.application.port = port.parse().map_err(|_| ConfigError::Env {
                name: "PORT",
                value: port,
            })?;
        }
        if let Some(token) = lookup("AUTH_TOKEN") {
            self.auth.token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssl.enable && (self.ssl.cert.is_none() || self.ssl.key.is_none()) {
            return Err(ConfigError::Invalid(
                "ssl.enable requires both ssl.cert and ssl.key".into(),
            ));
        }
        if self.query.max_page_size == 0 {
            return Err(ConfigError::Invalid("query.max_page_size must be at least 1".into()));
        }
        if self.queue.broker.capacity == 0 {
            return Err(ConfigError::Invalid("queue.capacity must be at least 1".into()));
        }
        if matches!(self.auth.token.as_deref(), Some("")) {
            return Err(ConfigError::Invalid("auth.token must not be empty".into()));
        }
        Ok(())
    }
}
