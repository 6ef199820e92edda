//! CLI commands and handlers
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::services::SwapChainService;
use crate::domain::execution::{CancelToken, Order, TimeService};
use crate::infrastructure::memory::{InMemoryPairRepository, ManualTimeService, TokioTimeService};
use crate::shared::errors::AppError;
use crate::shared::types::BotConfig;
use crate::shared::utils::now_timestamp;

#[derive(Parser)]
#[command(name = "swapchain")]
#[command(about = "Triangular sell-buy-sell swap bot for spot exchanges")]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true, default_value = "Config.toml")]
    pub config: String,

    /// Trading pairs JSON file (overrides config)
    #[arg(long, global = true)]
    pub pairs: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find the most profitable SBS chain for an asset
    Find {
        /// Asset to start and end with
        asset: String,

        /// Number of alternative chains to show
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Discover, validate and execute a chain on the paper exchange
    Swap {
        /// Asset to swap
        asset: String,

        /// Quantity of the triggering order
        #[arg(short, long)]
        quantity: f64,

        /// Id of the triggering order
        #[arg(long, default_value_t = 1)]
        order_id: i64,

        /// Skip real waits between fill polls
        #[arg(long)]
        instant: bool,

        /// Print the swap action as JSON
        #[arg(long)]
        json: bool,
    },

    /// Discover chains for several assets and list what was stored
    Chains {
        /// Assets to scan
        #[arg(required = true)]
        assets: Vec<String>,
    },
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(cli: Cli, config: BotConfig) -> Result<(), AppError> {
        let pairs_file = cli.pairs.unwrap_or_else(|| config.paper.pairs_file.clone());
        match cli.command {
            Commands::Find { asset, limit, json } => {
                Self::execute_find_command(&asset, limit, json, &pairs_file, config).await
            }
            Commands::Swap { asset, quantity, order_id, instant, json } => {
                Self::execute_swap_command(&asset, quantity, order_id, instant, json, &pairs_file, config).await
            }
            Commands::Chains { assets } => Self::execute_chains_command(&assets, &pairs_file, config).await,
        }
    }

    /// Load pairs and wire the paper service
    async fn paper_service(
        pairs_file: &str,
        config: &BotConfig,
        time_service: Arc<dyn TimeService>,
    ) -> Result<SwapChainService, AppError> {
        let pairs = Arc::new(InMemoryPairRepository::from_json_file(pairs_file)?);
        // fixture prices carry no live timestamps
        pairs.touch_all(time_service.now()).await;
        info!("📊 {} trading pairs ready", pairs.count().await);

        let (service, _) = SwapChainService::paper(config, pairs, time_service);
        Ok(service)
    }

    async fn execute_find_command(
        asset: &str,
        limit: usize,
        json: bool,
        pairs_file: &str,
        config: BotConfig,
    ) -> Result<(), AppError> {
        let service = Self::paper_service(pairs_file, &config, Arc::new(TokioTimeService::new())).await?;
        let discovery = service.discover(asset).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&discovery.result.chains)?);
            return Ok(());
        }

        match &discovery.chain {
            Some(chain) => {
                println!("🎯 Best chain for {}: {} ({})", asset, chain.title, chain.percent);
                for leg in chain.legs() {
                    println!("   {} {} @ {}", leg.side, leg.symbol, leg.price);
                }
            }
            None => println!("⏳ No SBS chain closes for {}", asset),
        }

        let mut alternatives = discovery.result.chains.clone();
        alternatives.sort_by(|a, b| b.percent.value().total_cmp(&a.percent.value()));
        if alternatives.len() > 1 {
            println!("\n📈 Top {} of {} evaluated chains:", limit.min(alternatives.len()), alternatives.len());
            for (i, chain) in alternatives.iter().take(limit).enumerate() {
                println!("  {}. {} ({})", i + 1, chain.title, chain.percent);
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_swap_command(
        asset: &str,
        quantity: f64,
        order_id: i64,
        instant: bool,
        json: bool,
        pairs_file: &str,
        config: BotConfig,
    ) -> Result<(), AppError> {
        let time_service: Arc<dyn TimeService> = if instant {
            Arc::new(ManualTimeService::new(now_timestamp()))
        } else {
            Arc::new(TokioTimeService::new())
        };
        let service = Self::paper_service(pairs_file, &config, time_service).await?;

        let Some(chain) = service.discover(asset).await?.chain else {
            println!("⏳ No SBS chain closes for {}", asset);
            return Ok(());
        };
        println!("🎯 Using {} ({})", chain.title, chain.percent);

        let order = Order {
            id: order_id,
            bot_id: config.bot_id,
            symbol: chain.swap_one.symbol.clone(),
            asset: asset.to_string(),
            executed_quantity: quantity,
            swap_action_id: None,
        };

        let token = CancelToken::new();
        let swap = service.swap_with(&order, token.clone());
        tokio::pin!(swap);
        let result = tokio::select! {
            result = &mut swap => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling swap of order #{} at the next poll", order.id);
                token.cancel();
                swap.await
            }
        };
        let action = result?;

        if json {
            println!("{}", serde_json::to_string_pretty(&action)?);
            return Ok(());
        }

        println!("✅ Swap action #{} {:?}", action.id.unwrap_or_default(), action.status);
        for leg in action.legs() {
            println!(
                "   {} {} {} @ {} -> order #{} {}",
                leg.side,
                leg.quantity.unwrap_or_default(),
                leg.symbol,
                leg.price,
                leg.external_id.unwrap_or_default(),
                leg.external_status.map(|s| s.as_str()).unwrap_or("-")
            );
        }
        if let Some(end_quantity) = action.end_quantity {
            println!("💰 {} {} -> {} {}", action.start_quantity, asset, end_quantity, asset);
        }

        Ok(())
    }

    async fn execute_chains_command(
        assets: &[String],
        pairs_file: &str,
        config: BotConfig,
    ) -> Result<(), AppError> {
        let service = Self::paper_service(pairs_file, &config, Arc::new(TokioTimeService::new())).await?;

        for asset in assets {
            if let Err(e) = service.discover(asset).await {
                warn!("Discovery for {} failed: {}", asset, e);
            }
        }

        let chains = service.chains().await?;
        if chains.is_empty() {
            println!("⏳ No chains stored");
            return Ok(());
        }

        println!("📋 {} stored chains:", chains.len());
        for chain in chains {
            println!(
                "  #{} {} {} (last {}, min {}, max {}) hash {}",
                chain.id.unwrap_or_default(),
                chain.chain_type,
                chain.title,
                chain.statistics.last_percent,
                chain.statistics.min_percent,
                chain.statistics.max_percent,
                chain.hash
            );
        }

        Ok(())
    }
}
