mod commands;
mod handlers;

pub use commands::{Cli, Command};

use crate::config::ConfigLoader;
use crate::logging::setup_logging;
use anyhow::{Context, Result};
use clap::Parser;

pub fn process_command() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load(cli.config.as_deref())?;
    setup_logging(&config)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    runtime.block_on(async {
        match cli.command {
            Command::Run => handlers::run(&config).await,
            Command::Drain => handlers::drain(&config).await,
            Command::Queue { json } => handlers::queue(&config, json).await,
            Command::Scan { card } => handlers::scan(&config, card).await,
        }
    })
}
