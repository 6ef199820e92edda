//! Pre-execution checks of a chain against current pairs and an order

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::execution::{Order, TimeService};
use crate::domain::pair::{PairRepository, TradingPair};
use crate::shared::errors::SwapError;
use super::{check_chain_consistency, Formatter, OrderSide, SwapChainEntity};

pub struct SwapValidator {
    pair_repository: Arc<dyn PairRepository>,
    time_service: Arc<dyn TimeService>,
    formatter: Formatter,
    swap_min_percent: f64,
    price_freshness_secs: i64,
}

impl SwapValidator {
    pub fn new(
        pair_repository: Arc<dyn PairRepository>,
        time_service: Arc<dyn TimeService>,
        swap_min_percent: f64,
        price_freshness_secs: i64,
    ) -> Self {
        Self {
            pair_repository,
            time_service,
            formatter: Formatter::new(),
            swap_min_percent,
            price_freshness_secs,
        }
    }

    /// Reject chains that cannot be executed for `order` right now
    pub async fn validate(&self, chain: &SwapChainEntity, order: &Order) -> Result<(), SwapError> {
        let mut pairs = Vec::with_capacity(3);
        for leg in chain.legs() {
            let pair = self
                .pair_repository
                .get_pair_by_symbol(&leg.symbol)
                .await?
                .ok_or_else(|| SwapError::PairNotFound(leg.symbol.clone()))?;
            pairs.push(pair);
        }

        check_chain_consistency(chain.legs())?;

        if !chain.percent.gte(self.swap_min_percent) {
            debug!(
                "Chain {} at {} is below {}%",
                chain.title, chain.percent, self.swap_min_percent
            );
            return Err(SwapError::BelowThreshold {
                percent: chain.percent.value(),
                min_percent: self.swap_min_percent,
            });
        }

        let now = self.time_service.now();
        let mut amount = order.executed_quantity;
        for (leg, pair) in chain.legs().into_iter().zip(&pairs) {
            if !pair.is_price_fresh(now, self.price_freshness_secs) {
                warn!("Price of {} is {}s old", pair.symbol, pair.price_age(now));
                return Err(SwapError::StalePrice(pair.symbol.clone()));
            }

            // orders go out at the tick-rounded price
            let price = self.formatter.round_price(pair, leg.price);
            let quantity = self.projected_quantity(pair, leg.side, price, amount);
            if !pair.is_quantity_allowed(quantity) {
                return Err(SwapError::QuantityOutOfRange {
                    symbol: pair.symbol.clone(),
                    quantity,
                    min: pair.min_quantity,
                    max: pair.max_quantity,
                });
            }

            amount = match leg.side {
                OrderSide::Sell => quantity * price,
                OrderSide::Buy => quantity,
            };
        }

        debug!(
            "Chain {} valid for order #{}: {} -> {} {}",
            chain.title,
            order.id,
            order.executed_quantity,
            amount,
            chain.asset()
        );
        Ok(())
    }

    fn projected_quantity(&self, pair: &TradingPair, side: OrderSide, price: f64, amount: f64) -> f64 {
        match side {
            OrderSide::Sell => self.formatter.round_quantity(pair, amount),
            OrderSide::Buy => self.formatter.round_quantity(pair, amount / price),
        }
    }
}
