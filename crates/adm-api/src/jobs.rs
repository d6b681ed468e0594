//! # Scheduled Jobs
//!
//! Jobs are declared in config and bound by name to a [`JobTarget`]
//! registered in a [`JobRegistry`]. Each enabled job runs on its own task at
//! a fixed interval, first firing one interval after startup. A failing run
//! is logged and the schedule continues. Unknown targets are skipped with a
//! warning so one typo does not keep the server from starting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::DataSourceError;
use crate::state::AppState;

/// One job as configured.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobConfig {
    pub job_id: i64,
    pub name: String,
    /// Key into the [`JobRegistry`].
    pub target: String,
    pub interval_secs: u64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),
}

/// Work a job performs on each tick.
#[async_trait::async_trait]
pub trait JobTarget: Send + Sync + 'static {
    async fn run(&self, state: &AppState) -> Result<(), JobError>;
}

/// Pings the data source so connectivity problems show up in the logs.
#[derive(Debug, Default)]
pub struct PingDataSource;

#[async_trait::async_trait]
impl JobTarget for PingDataSource {
    async fn run(&self, state: &AppState) -> Result<(), JobError> {
        state.data.ping().await?;
        tracing::debug!(backend = state.data.backend(), "data source reachable");
        Ok(())
    }
}

/// Named job targets.
#[derive(Clone, Default)]
pub struct JobRegistry {
    targets: HashMap<String, Arc<dyn JobTarget>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in targets.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ping_data_source", PingDataSource);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, target: impl JobTarget) -> &mut Self {
        self.targets.insert(name.into(), Arc::new(target));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobTarget>> {
        self.targets.get(name).cloned()
    }
}

/// Running job tasks. Dropping the set leaves them running; call
/// [`JobSet::stop`] during shutdown.
#[derive(Debug, Default)]
pub struct JobSet {
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl JobSet {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Abort every job task.
    pub fn stop(self) {
        for (name, task) in self.tasks {
            task.abort();
            tracing::debug!(job = %name, "job stopped");
        }
    }
}

/// Spawn a task per enabled job with a known target.
pub fn start(jobs: &[JobConfig], registry: &JobRegistry, state: &AppState) -> JobSet {
    let mut set = JobSet::default();
    for job in jobs.iter().filter(|j| j.enabled) {
        let Some(target) = registry.get(&job.target) else {
            tracing::warn!(job = %job.name, target = %job.target, "unknown job target; job skipped");
            continue;
        };
        if job.interval_secs == 0 {
            tracing::warn!(job = %job.name, "job interval must be positive; job skipped");
            continue;
        }

        let period = Duration::from_secs(job.interval_secs);
        let state = state.clone();
        let name = job.name.clone();
        let job_id = job.job_id;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match target.run(&state).await {
                    Ok(()) => tracing::debug!(job_id, job = %name, "job run finished"),
                    Err(e) => tracing::error!(job_id, job = %name, error = %e, "job run failed"),
                }
            }
        });
        tracing::info!(job_id, job = %job.name, target = %job.target, every = ?period, "job scheduled");
        set.tasks.push((job.name.clone(), task));
    }
    set
}
