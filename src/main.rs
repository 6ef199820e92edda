use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use swapchain::application::{Cli, CommandExecutor};
use swapchain::shared::config::ConfigLoader;
use swapchain::shared::types::BotConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config = if Path::new(&cli.config).exists() {
        ConfigLoader::load_from(&cli.config)?
    } else {
        warn!("{} not found, using default settings", cli.config);
        BotConfig::default()
    };

    CommandExecutor::execute(cli, config).await?;
    Ok(())
}
