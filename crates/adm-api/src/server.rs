//! # Server Lifecycle
//!
//! ```text
//! Uninitialized → ConfigLoaded → ResourcesBound → Listening → ShuttingDown → Stopped
//! ```
//!
//! Every transition is logged. The listener is bound before anything is
//! served, so a port conflict fails startup instead of surfacing later from
//! a background task. On SIGINT or SIGTERM the server stops accepting,
//! gives in-flight requests `server.shutdown_grace_secs` to finish, force
//! closes whatever is left, then stops the queue consumer.

use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use adm_queue::{BrokerBuilder, ConsumerHandle};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{AppConfig, SslConfig};
use crate::db::{self, DataSource, MemoryDataSource, PgDataSource};
use crate::jobs::{self, JobRegistry};
use crate::models::{consumers, AuditEvent};
use crate::state::AppState;

/// Bound on joining the queue consumer after the HTTP side has stopped.
const CONSUMER_STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on the serve task exiting after a forced close.
const FORCE_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("database initialization failed: {0}")]
    Database(#[source] sqlx::Error),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS configuration failed: {0}")]
    Tls(String),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server task failed: {0}")]
    Task(String),
}

/// Lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    ConfigLoaded,
    ResourcesBound,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Tracks and logs the current phase.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn advance(&mut self, next: LifecycleState) {
        tracing::info!(from = ?self.state, to = ?next, "lifecycle transition");
        self.state = next;
    }
}

/// How draining ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished within the grace period.
    Graceful,
    /// The grace period elapsed and remaining connections were closed.
    TimedOut,
}

/// Startup switches from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOptions {
    /// Publish the route inventory on `ApiCheck` once listening.
    pub publish_api: bool,
}

/// Bind the listener. Failure here is fatal.
pub fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind((host, port)).map_err(|source| ServerError::Bind {
        addr: addr.clone(),
        source,
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| ServerError::Bind { addr, source })?;
    Ok(listener)
}

/// Load PEM certificate and key when TLS is enabled.
pub async fn tls_config(ssl: &SslConfig) -> Result<Option<RustlsConfig>, ServerError> {
    if !ssl.enable {
        return Ok(None);
    }
    let (Some(cert), Some(key)) = (&ssl.cert, &ssl.key) else {
        return Err(ServerError::Tls("ssl.enable requires ssl.cert and ssl.key".into()));
    };
    RustlsConfig::from_pem_file(cert, key)
        .await
        .map(Some)
        .map_err(|e| ServerError::Tls(format!("{}: {e}", cert.display())))
}

/// An HTTP server serving on its own task.
#[derive(Debug)]
pub struct RunningServer {
    handle: Handle,
    task: JoinHandle<std::io::Result<()>>,
    local_addr: SocketAddr,
}

impl RunningServer {
    /// Start serving `router` on an already-bound listener.
    pub fn start(
        listener: TcpListener,
        router: Router,
        tls: Option<RustlsConfig>,
    ) -> Result<Self, ServerError> {
        let local_addr = listener.local_addr().map_err(ServerError::Serve)?;
        let handle = Handle::new();
        let service = router.into_make_service_with_connect_info::<SocketAddr>();
        let task = match tls {
            Some(tls) => {
                let server = axum_server::from_tcp_rustls(listener, tls).handle(handle.clone());
                tokio::spawn(server.serve(service))
            }
            None => {
                let server = axum_server::from_tcp(listener).handle(handle.clone());
                tokio::spawn(server.serve(service))
            }
        };
        Ok(Self {
            handle,
            task,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for `signal`. Returns early with an error if the server stops
    /// on its own.
    pub async fn wait(&mut self, signal: impl Future<Output = ()>) -> Result<(), ServerError> {
        tokio::select! {
            _ = signal => Ok(()),
            joined = &mut self.task => Err(match joined {
                Ok(Ok(())) => ServerError::Task("server stopped unexpectedly".into()),
                Ok(Err(e)) => ServerError::Serve(e),
                Err(e) => ServerError::Task(e.to_string()),
            }),
        }
    }

    /// Stop accepting and drain for at most `grace`, then force close.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownOutcome {
        tracing::info!(
            connections = self.handle.connection_count(),
            ?grace,
            "draining in-flight requests"
        );
        self.handle.graceful_shutdown(None);

        let outcome = match tokio::time::timeout(grace, &mut self.task).await {
            Ok(joined) => {
                log_exit(joined);
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                tracing::warn!(
                    connections = self.handle.connection_count(),
                    ?grace,
                    "shutdown grace period elapsed; closing remaining connections"
                );
                self.handle.shutdown();
                match tokio::time::timeout(FORCE_CLOSE_TIMEOUT, &mut self.task).await {
                    Ok(joined) => log_exit(joined),
                    Err(_) => self.task.abort(),
                }
                ShutdownOutcome::TimedOut
            }
        };
        tracing::info!(?outcome, "http server stopped");
        outcome
    }
}

fn log_exit(joined: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "http server exited with error"),
        Err(e) => tracing::error!(error = %e, "http server task failed"),
    }
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}

async fn data_source(config: &AppConfig) -> Result<Arc<dyn DataSource>, ServerError> {
    match db::init_pool(&config.database).await.map_err(ServerError::Database)? {
        Some(pool) => Ok(Arc::new(PgDataSource::new(pool))),
        None => Ok(Arc::new(MemoryDataSource::new())),
    }
}

fn banner(config: &AppConfig, addr: SocketAddr, tls: bool) {
    let scheme = if tls { "https" } else { "http" };
    let app = &config.application;
    tracing::info!(
        name = %app.name,
        mode = %app.mode,
        locale = ?app.locale,
        timezone = %app.timezone,
        "server started"
    );
    tracing::info!("  - Local:   {scheme}://localhost:{}/", addr.port());
    tracing::info!("  - Network: {scheme}://{addr}/");
    tracing::info!("press Ctrl+C to shut down");
}

/// Run the server until a shutdown signal.
pub async fn run(config: AppConfig, options: ServerOptions) -> Result<ShutdownOutcome, ServerError> {
    run_until(config, options, JobRegistry::with_builtins(), shutdown_signal()).await
}

/// Run the server until `signal` resolves.
pub async fn run_until(
    config: AppConfig,
    options: ServerOptions,
    registry: JobRegistry,
    signal: impl Future<Output = ()>,
) -> Result<ShutdownOutcome, ServerError> {
    let mut lifecycle = Lifecycle::new();
    lifecycle.advance(LifecycleState::ConfigLoaded);

    let data = data_source(&config).await?;
    let mut builder = BrokerBuilder::<AuditEvent>::new(config.queue.broker.clone());
    consumers::register(&mut builder, Arc::clone(&data));
    let (publisher, consumer) = builder.start();
    let grace = config.server.shutdown_grace();
    let jobs_config = config.jobs.clone();
    let state = AppState::new(config, data, publisher);
    let (router, inventory) = crate::app_with_inventory(state.clone());
    let (mut server, tls, consumer) = listen(&state.config, router, consumer, &mut lifecycle).await?;
    banner(&state.config, server.local_addr(), tls);

    let job_set = jobs::start(&jobs_config, &registry, &state);
    if options.publish_api {
        let publisher = state.publisher.clone();
        tokio::spawn(async move {
            let routes = inventory.len();
            match publisher.publish(AuditEvent::ApiCheck(inventory)).await {
                Ok(()) => tracing::info!(routes, "api inventory published"),
                Err(e) => tracing::error!(error = %e, "api inventory not published"),
            }
        });
    }

    let waited = server.wait(signal).await;
    lifecycle.advance(LifecycleState::ShuttingDown);
    job_set.stop();
    let outcome = match waited {
        Ok(()) => Ok(server.shutdown(grace).await),
        Err(e) => Err(e),
    };
    drop(state);
    stop_consumer(consumer).await;
    lifecycle.advance(LifecycleState::Stopped);
    outcome
}

/// Load TLS, bind and start serving. Every failure stops `consumer`
/// before returning; on success it is handed back for shutdown.
async fn listen(
    config: &AppConfig,
    router: Router,
    consumer: ConsumerHandle,
    lifecycle: &mut Lifecycle,
) -> Result<(RunningServer, bool, ConsumerHandle), ServerError> {
    let started = async {
        let tls = tls_config(&config.ssl).await?;
        lifecycle.advance(LifecycleState::ResourcesBound);
        let listener = bind(&config.application.host, config.application.port)?;
        let has_tls = tls.is_some();
        let server = RunningServer::start(listener, router, tls)?;
        lifecycle.advance(LifecycleState::Listening);
        Ok::<_, ServerError>((server, has_tls))
    }
    .await;
    match started {
        Ok((server, has_tls)) => Ok((server, has_tls, consumer)),
        Err(e) => {
            stop_consumer(consumer).await;
            Err(e)
        }
    }
}

async fn stop_consumer(consumer: ConsumerHandle) {
    if !consumer.shutdown(CONSUMER_STOP_TIMEOUT).await {
        tracing::warn!("queue consumer did not stop cleanly");
    }
}
