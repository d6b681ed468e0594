//! # adm-cli
//!
//! Subcommand handlers for the `adm` binary. Each handler returns the
//! process exit code or an `anyhow::Error`; `main` only parses arguments
//! and maps the result.

pub mod logging;
pub mod server;
