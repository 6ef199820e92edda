//! Common types used across the application

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Chain discovery and validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    pub min_percent: f64,
    pub fee_percent: f64,
    pub price_freshness_secs: i64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            min_percent: 0.1,
            fee_percent: 0.2,
            price_freshness_secs: 3600,
        }
    }
}

/// Order placement and fill polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub initial_delay_secs: u64,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub cancel_on_timeout: bool,
    pub reconcile_balance: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            poll_interval_secs: 7,
            max_poll_attempts: 120, // ~14 minutes per leg
            cancel_on_timeout: true,
            reconcile_balance: true,
        }
    }
}

/// Simulated exchange used by the `swap` command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub pairs_file: String,
    pub fill_after_polls: u32,
    pub balances: HashMap<String, f64>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            pairs_file: "data/swap_pairs.json".to_string(),
            fill_after_polls: 1,
            balances: HashMap::from([("ETH".to_string(), 100.0)]),
        }
    }
}

/// Bot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub bot_id: i64,
    pub swap: SwapConfig,
    pub execution: ExecutionConfig,
    pub paper: PaperConfig,
}
