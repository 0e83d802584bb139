//! Parley - Main entry point.

use anyhow::{Context, Result};
use parley_common::config::Config;
use parley_common::logging::init_logging;
use parley_irc::start;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration, environment variables take precedence
    let config = Config::load_with_env().context("Failed to load configuration")?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Parley v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("Invalid configuration")?;

    start(&config).await
}
