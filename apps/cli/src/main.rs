//! TenderWatch CLI: tender-notice ingestion and decision pipeline.
//!
//! Fetches a notice list, detects new or changed notices, decides which are
//! worth pursuing, and keeps the results in a local database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
