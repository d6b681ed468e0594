//! `adm server`: load the settings file and serve until SIGINT/SIGTERM.

use std::path::PathBuf;

use adm_api::config::{AppConfig, LoggerConfig};
use adm_api::server::{self, ServerOptions, ShutdownOutcome};
use anyhow::Context;
use clap::Args;

use crate::logging;

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Path to the YAML settings file.
    #[arg(short, long, default_value = "config/settings.yml")]
    pub config: PathBuf,

    /// Record the route inventory in `sys_api` once the server is listening.
    #[arg(short, long)]
    pub api: bool,
}

/// Run the server. Logging is configured from the settings file, or from
/// defaults when the file cannot be loaded so the failure is still reported.
pub fn run_server(args: &ServerArgs, verbose: u8) -> anyhow::Result<u8> {
    let loaded = AppConfig::load(&args.config);
    let logger = match &loaded {
        Ok(config) => config.logger.clone(),
        Err(_) => LoggerConfig::default(),
    };
    logging::init(&logger, verbose);

    let config = loaded.context("configuration not loaded")?;
    tracing::debug!(path = %args.config.display(), mode = %config.application.mode, "configuration loaded");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let options = ServerOptions { publish_api: args.api };
    let outcome = runtime
        .block_on(server::run(config, options))
        .context("server failed")?;

    if outcome == ShutdownOutcome::TimedOut {
        tracing::warn!("some requests were cut off during shutdown");
    }
    Ok(0)
}
