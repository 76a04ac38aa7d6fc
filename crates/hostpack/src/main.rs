//! hostpack CLI - package, back up and self-update a hosted deployment
//!
//! This is the main entry point for the hostpack command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    // This must be done before any TLS operations
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let config = cli.config.as_deref();
    let progress = !cli.quiet;

    match cli.command {
        Commands::Check(args) => commands::check::run(args, config, progress).await,
        Commands::Update(args) => commands::update::run(args, config, progress).await,
        Commands::Restore(args) => commands::restore::run(args, config, progress),
        Commands::Package(args) => commands::package::run(args, config, progress),
        Commands::Backups(cmd) => commands::backups::run(cmd, config),
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
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
