//! nbpublish CLI: manifest-driven notebook publishing.
//!
//! Derives website fragments, Nexus-ready notebooks and portable CI builds
//! from canonical sources, syncs them to external working directories, and
//! runs CI profiles over the built notebooks.

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
