//! relaunch - self-updating launcher
//!
//! Checks the launcher and client against their release hosts, installs
//! updates and relaunches. The same binary doubles as the update helper
//! (`relaunch apply`) that replaces a launcher installation once the
//! launcher has exited.

mod cli;
mod commands;
mod listener;
mod output;
mod utils;
mod version;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is opened
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Version(args) => commands::version::run(args),
        Commands::Check(args) => commands::check::run(args, &cli.global).await,
        Commands::Update(args) => commands::update::run(args, &cli.global).await,
        Commands::DownloadUpdate(args) => commands::download_update::run(args, &cli.global).await,
        Commands::Apply(args) => commands::apply::run(args, &cli.global).await,
        Commands::Launch(args) => commands::launch::run(args, &cli.global).await,
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
