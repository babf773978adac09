use crate::config::Config;
use crate::constants::LOG_FILE;
use anyhow::{Context, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::SystemTime},
    prelude::*,
    EnvFilter,
};

/// Installs the global subscriber: a detailed file log in `log_dir` and a
/// compact stderr log for whoever is watching the console. `RUST_LOG`
/// overrides the configured level.
pub fn setup_logging(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", config.log_dir))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;

    let file_appender = RollingFileAppender::new(Rotation::NEVER, &config.log_dir, LOG_FILE);

    let file_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_level(true)
        .with_timer(SystemTime)
        .with_ansi(false)
        .with_writer(file_appender);

    let console_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    tracing::info!(
        "Logging system initialized. Writing to {:?}",
        config.log_dir.join(LOG_FILE)
    );

    Ok(())
}
