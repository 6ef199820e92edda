//! Swap domain - three-leg chain discovery, building and validation

mod chain_builder;
mod chain_finder;
mod chain_repository;
mod formatter;
mod swap_validator;

pub use chain_builder::SwapChainBuilder;
pub use chain_finder::SbsSwapFinder;
pub use chain_repository::ChainRepository;
pub use formatter::{Formatter, Percent};
pub use swap_validator::SwapValidator;

use std::fmt;

use serde::{Deserialize, Serialize};
use crate::domain::pair::TradingPair;
use crate::shared::errors::SwapError;

/// Sell-buy-sell chain type tag
pub const CHAIN_TYPE_SBS: &str = "SBS";

/// Direction of a single leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One trade of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapLeg {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price: f64,
    pub side: OrderSide,
}

impl SwapLeg {
    pub fn from_pair(pair: &TradingPair, side: OrderSide) -> Self {
        Self {
            symbol: pair.symbol.clone(),
            base_asset: pair.base_asset.clone(),
            quote_asset: pair.quote_asset.clone(),
            price: pair.last_price,
            side,
        }
    }

    /// Asset spent by this leg
    pub fn input_asset(&self) -> &str {
        match self.side {
            OrderSide::Sell => &self.base_asset,
            OrderSide::Buy => &self.quote_asset,
        }
    }

    /// Asset received by this leg
    pub fn output_asset(&self) -> &str {
        match self.side {
            OrderSide::Sell => &self.quote_asset,
            OrderSide::Buy => &self.base_asset,
        }
    }

    /// Amount of output asset received for `amount` of input asset, fees excluded
    pub fn convert(&self, amount: f64) -> f64 {
        match self.side {
            OrderSide::Sell => amount * self.price,
            OrderSide::Buy => amount / self.price,
        }
    }
}

/// Deterministic lookup key for a chain of the given type over three symbols
pub fn chain_hash(chain_type: &str, legs: [&SwapLeg; 3]) -> String {
    let key = format!(
        "{}:{}:{}:{}",
        chain_type, legs[0].symbol, legs[1].symbol, legs[2].symbol
    );
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, key.as_bytes())
        .simple()
        .to_string()
}

/// Legs must close the cycle and the first two legs must share a quote asset
pub fn check_chain_consistency(legs: [&SwapLeg; 3]) -> Result<(), SwapError> {
    let [one, two, three] = legs;

    if two.input_asset() != one.output_asset() {
        return Err(SwapError::InconsistentChain(format!(
            "{} spends {} but {} yields {}",
            two.symbol,
            two.input_asset(),
            one.symbol,
            one.output_asset()
        )));
    }
    if three.input_asset() != two.output_asset() {
        return Err(SwapError::InconsistentChain(format!(
            "{} spends {} but {} yields {}",
            three.symbol,
            three.input_asset(),
            two.symbol,
            two.output_asset()
        )));
    }
    if three.output_asset() != one.input_asset() {
        return Err(SwapError::InconsistentChain(format!(
            "{} ends in {} instead of {}",
            three.symbol,
            three.output_asset(),
            one.input_asset()
        )));
    }
    if one.quote_asset != two.quote_asset {
        return Err(SwapError::InconsistentChain(format!(
            "{} and {} do not share a quote asset",
            one.symbol, two.symbol
        )));
    }

    Ok(())
}

/// Chain found by the finder, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapChainCandidate {
    pub title: String,
    pub chain_type: String,
    pub percent: Percent,
    pub swap_one: SwapLeg,
    pub swap_two: SwapLeg,
    pub swap_three: SwapLeg,
    pub timestamp: i64,
}

impl SwapChainCandidate {
    pub fn legs(&self) -> [&SwapLeg; 3] {
        [&self.swap_one, &self.swap_two, &self.swap_three]
    }

    pub fn hash(&self) -> String {
        chain_hash(&self.chain_type, self.legs())
    }

    /// Product of the three leg conversions, fees excluded
    pub fn conversion_factor(&self) -> f64 {
        self.legs().iter().fold(1.0, |amount, leg| leg.convert(amount))
    }
}

/// Historical percent observations of a chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainStatistics {
    pub max_percent: Percent,
    pub max_percent_timestamp: Option<i64>,
    pub min_percent: Percent,
    pub min_percent_timestamp: Option<i64>,
    pub last_percent: Percent,
    pub last_percent_timestamp: Option<i64>,
}

impl ChainStatistics {
    /// Fold a new observation into min/max/last
    pub fn observe(&self, percent: Percent, timestamp: i64) -> Self {
        let mut next = self.clone();

        if self.max_percent_timestamp.is_none() || percent.value() > self.max_percent.value() {
            next.max_percent = percent;
            next.max_percent_timestamp = Some(timestamp);
        }
        if self.min_percent_timestamp.is_none() || percent.value() < self.min_percent.value() {
            next.min_percent = percent;
            next.min_percent_timestamp = Some(timestamp);
        }
        next.last_percent = percent;
        next.last_percent_timestamp = Some(timestamp);

        next
    }
}

/// Persisted swap chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapChainEntity {
    pub id: Option<i64>,
    pub title: String,
    pub chain_type: String,
    pub hash: String,
    pub swap_one: SwapLeg,
    pub swap_two: SwapLeg,
    pub swap_three: SwapLeg,
    pub percent: Percent,
    pub statistics: ChainStatistics,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SwapChainEntity {
    pub fn legs(&self) -> [&SwapLeg; 3] {
        [&self.swap_one, &self.swap_two, &self.swap_three]
    }

    /// Asset the chain starts and ends with
    pub fn asset(&self) -> &str {
        self.swap_one.input_asset()
    }
}

/// Finder output: best chain plus every evaluated chain for diagnostics
#[derive(Debug, Clone, Default)]
pub struct BestChainResult {
    pub best_chain: Option<SwapChainCandidate>,
    pub chains: Vec<SwapChainCandidate>,
}
