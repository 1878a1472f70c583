//! riskclause CLI: contract clause risk classification.
//!
//! Classifies the clauses of a contract PDF against a scored risk table
//! and reports the extracted sentences by severity band.

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
