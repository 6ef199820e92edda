//! Sell-buy-sell chain search over known trading pairs

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::execution::TimeService;
use crate::domain::pair::{PairRepository, TradingPair};
use crate::shared::errors::SwapError;
use super::{BestChainResult, Formatter, OrderSide, Percent, SwapChainCandidate, SwapLeg, CHAIN_TYPE_SBS};

/// Finds `A -sell-> Q -buy-> B -sell-> A` cycles starting from an asset
pub struct SbsSwapFinder {
    pair_repository: Arc<dyn PairRepository>,
    time_service: Arc<dyn TimeService>,
    formatter: Formatter,
    fee_percent: f64,
    price_freshness_secs: i64,
}

impl SbsSwapFinder {
    pub fn new(
        pair_repository: Arc<dyn PairRepository>,
        time_service: Arc<dyn TimeService>,
        fee_percent: f64,
        price_freshness_secs: i64,
    ) -> Self {
        Self {
            pair_repository,
            time_service,
            formatter: Formatter::new(),
            fee_percent,
            price_freshness_secs,
        }
    }

    /// Evaluate every SBS cycle for `asset` and keep the most profitable one
    pub async fn find(&self, asset: &str) -> Result<BestChainResult, SwapError> {
        let now = self.time_service.now();
        let mut result = BestChainResult::default();

        let sell_pairs = self.usable(self.pair_repository.get_pairs_by_base_asset(asset).await?, now);

        for one in &sell_pairs {
            let buy_pairs = self.usable(
                self.pair_repository.get_pairs_by_quote_asset(&one.quote_asset).await?,
                now,
            );

            for two in buy_pairs.iter().filter(|p| p.symbol != one.symbol && p.base_asset != asset) {
                let close_pairs = self.usable(
                    self.pair_repository.get_pairs_by_base_asset(&two.base_asset).await?,
                    now,
                );

                for three in close_pairs.iter().filter(|p| p.quote_asset == asset) {
                    let candidate = self.evaluate(asset, one, two, three, now);
                    debug!("Evaluated {} ({})", candidate.title, candidate.percent);

                    let better = result
                        .best_chain
                        .as_ref()
                        .map_or(true, |best| candidate.percent.value() > best.percent.value());
                    if better {
                        result.best_chain = Some(candidate.clone());
                    }
                    result.chains.push(candidate);
                }
            }
        }

        match &result.best_chain {
            Some(best) => info!(
                "Best {} chain for {}: {} ({}), {} evaluated",
                CHAIN_TYPE_SBS,
                asset,
                best.title,
                best.percent,
                result.chains.len()
            ),
            None => debug!("No {} chain closes for {}", CHAIN_TYPE_SBS, asset),
        }

        Ok(result)
    }

    /// Drop pairs whose price is stale or unusable
    fn usable(&self, pairs: Vec<TradingPair>, now: i64) -> Vec<TradingPair> {
        pairs
            .into_iter()
            .filter(|pair| {
                let fresh = pair.is_price_fresh(now, self.price_freshness_secs);
                if !fresh {
                    debug!("Skipping {}: price is {}s old", pair.symbol, pair.price_age(now));
                }
                fresh && pair.last_price > 0.0
            })
            .collect()
    }

    fn evaluate(
        &self,
        asset: &str,
        one: &TradingPair,
        two: &TradingPair,
        three: &TradingPair,
        now: i64,
    ) -> SwapChainCandidate {
        let mut candidate = SwapChainCandidate {
            title: format!(
                "{} sell-> {} buy-> {} sell-> {}",
                asset, one.quote_asset, two.base_asset, asset
            ),
            chain_type: CHAIN_TYPE_SBS.to_string(),
            percent: Percent::default(),
            swap_one: SwapLeg::from_pair(one, OrderSide::Sell),
            swap_two: SwapLeg::from_pair(two, OrderSide::Buy),
            swap_three: SwapLeg::from_pair(three, OrderSide::Sell),
            timestamp: now,
        };

        let fee_factor = (1.0 - self.fee_percent / 100.0).powi(3);
        let factor = candidate.conversion_factor() * fee_factor;
        candidate.percent = Percent::from(self.formatter.to_fixed(self.formatter.percent(1.0, factor), 2));

        candidate
    }
}
