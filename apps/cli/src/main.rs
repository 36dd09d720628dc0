//! SkillCatalog CLI: the worker loop and its administrative commands.
//!
//! Crawls skill repositories, validates and security-scans each SKILL.md,
//! and publishes accepted skills into the local catalog database.

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
