//! Subscriber setup.

use adm_api::config::LoggerConfig;
use tracing_subscriber::EnvFilter;

/// Filter directive for a verbosity count. `-v` and up override the
/// configured level; without flags `RUST_LOG` wins over the config.
pub fn directive(configured: &str, verbose: u8) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(logger: &LoggerConfig, verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logger.level)),
        _ => EnvFilter::new(directive(&logger.level, verbose)),
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let installed = if logger.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
