//! coursepath CLI binary entry point.
//!
//! Initializes the tracing subscriber, parses command-line arguments with
//! clap, and dispatches to the selected subcommand via [`Cli::run`].

mod cli;
mod logging;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Extract the data directory and session before consuming cli.
    let (data_dir, session) = cli.log_context();

    // Clean old logs (best-effort, before tracing is initialized).
    logging::cleanup_old_logs(&data_dir);

    let _guard = logging::init_tracing(&data_dir, session.as_deref())?;

    cli.run().await
}
