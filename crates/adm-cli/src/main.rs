//! # adm CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use adm_cli::server::{run_server, ServerArgs};

/// Admin API server.
#[derive(Parser, Debug)]
#[command(name = "adm", version, about, long_about = None)]
struct Cli {
    /// Raise log verbosity above the configured level (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server.
    Server(ServerArgs),

    /// Print the version and exit.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Server(args) => run_server(&args, cli.verbose),
        Commands::Version => {
            println!("adm {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn server_defaults() {
        let cli = Cli::try_parse_from(["adm", "server"]).unwrap();
        let Commands::Server(args) = cli.command else {
            panic!("expected server command");
        };
        assert_eq!(args.config, Path::new("config/settings.yml"));
        assert!(!args.api);
    }

    #[test]
    fn server_flags() {
        let cli = Cli::try_parse_from(["adm", "-v", "server", "-c", "/etc/adm.yml", "--api"]).unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Server(args) = cli.command else {
            panic!("expected server command");
        };
        assert_eq!(args.config, Path::new("/etc/adm.yml"));
        assert!(args.api);
    }

    #[test]
    fn version_takes_no_arguments() {
        assert!(Cli::try_parse_from(["adm", "version"]).is_ok());
        assert!(Cli::try_parse_from(["adm", "version", "extra"]).is_err());
    }
}
