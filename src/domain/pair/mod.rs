//! Pair domain - tradable spot instruments

mod pair_repository;

pub use pair_repository::PairRepository;

use serde::{Deserialize, Serialize};

/// Spot trading pair with its last known price and lot rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPair {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub last_price: f64,
    pub price_timestamp: i64,
    pub min_quantity: f64,
    pub max_quantity: f64,
    pub min_price: f64,
    pub quantity_step: f64,
    pub price_tick: f64,
}

impl TradingPair {
    /// Seconds elapsed since the last price update
    pub fn price_age(&self, now: i64) -> i64 {
        now - self.price_timestamp
    }

    /// Price may only be used for decisions while younger than `freshness_secs`
    pub fn is_price_fresh(&self, now: i64, freshness_secs: i64) -> bool {
        self.price_age(now) < freshness_secs
    }

    pub fn is_quantity_allowed(&self, quantity: f64) -> bool {
        quantity >= self.min_quantity && (self.max_quantity <= 0.0 || quantity <= self.max_quantity)
    }
}
