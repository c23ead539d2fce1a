//! `xp3` binary entry point.
//!
//! Thin wrapper around the xp3-tool library that:
//! 1. Parses command-line arguments
//! 2. Initializes logging
//! 3. Runs the selected command
//!
//! Reports go to stdout, logs to stderr. `RUST_LOG` controls verbosity.

use anyhow::{Context, Result};
use clap::Parser;
use xp3_tool::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::debug!("Running {:?}", cli.command);

    let mut stdout = std::io::stdout().lock();
    xp3_tool::run(&cli, &mut stdout).context("xp3 command failed")?;

    Ok(())
}
