//! wgmesh — automatic encrypted overlay mesh networks over WireGuard.
//!
//! `bootstrap` starts the first node of a mesh; `join` connects a new node
//! to an existing one. `info`, `tags` and `rtt` talk to a running node's
//! local agent socket. Environment variables with the `WGMESH_` prefix
//! override the equivalent flags.

mod agent_client;
mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.debug);

    let result = match cli.command {
        Commands::Bootstrap(args) => commands::bootstrap::run(args).await,
        Commands::Join(args) => commands::join::run(args).await,
        Commands::Info(args) => commands::info::run(args).await,
        Commands::Tags(args) => commands::tags::run(args).await,
        Commands::Rtt(args) => commands::rtt::run(args).await,
        Commands::Ui(args) => commands::ui::run(args).await,
        Commands::Version => {
            println!("wgmesh {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, debug: bool) {
    let default_level = if debug {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_env("WGMESH_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
