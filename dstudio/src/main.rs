//! Database studio command-line tool.
//!
//! Connects to a database and prints its metadata, table data or query
//! results as JSON. Saved connection strings are encrypted with
//! AES-256-GCM.
//!
//! # Security Guarantees
//! - Passwords are read from a prompt or the environment, never logged
//! - Connection strings are redacted in every log line
//! - Configuration errors stop the process before any database work

use clap::Parser;
use dstudio::{Cli, run};
use dstudio_core::{Result, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format.into())?;

    run(cli.command).await.inspect_err(|e| {
        tracing::error!("{}", e);
    })
}
