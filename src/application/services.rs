//! Application services and use cases

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::execution::{
    ActionRepository, BalanceProvider, CancelToken, ExchangeOrderApi, Order, OrderUpdater, SwapAction,
    SwapExecutor, TimeService,
};
use crate::domain::pair::PairRepository;
use crate::domain::swap::{
    BestChainResult, ChainRepository, ChainStatistics, SbsSwapFinder, SwapChainBuilder, SwapChainEntity,
    SwapValidator,
};
use crate::infrastructure::memory::{InMemoryActionRepository, InMemoryChainRepository, InMemoryOrderUpdater};
use crate::infrastructure::paper::PaperExchange;
use crate::shared::errors::SwapError;
use crate::shared::types::BotConfig;

/// Outcome of a discovery run
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub result: BestChainResult,
    /// Stored and cached best chain
    pub chain: Option<SwapChainEntity>,
}

/// Exchange-facing collaborators of the executor
pub struct ExchangeContext {
    pub balance_provider: Arc<dyn BalanceProvider>,
    pub exchange: Arc<dyn ExchangeOrderApi>,
    pub action_repository: Arc<dyn ActionRepository>,
    pub order_updater: Arc<dyn OrderUpdater>,
}

/// Discovery and execution of swap chains for one bot
pub struct SwapChainService {
    finder: SbsSwapFinder,
    builder: SwapChainBuilder,
    validator: SwapValidator,
    executor: SwapExecutor,
    chain_repository: Arc<dyn ChainRepository>,
    time_service: Arc<dyn TimeService>,
}

impl SwapChainService {
    pub fn new(
        config: &BotConfig,
        pair_repository: Arc<dyn PairRepository>,
        chain_repository: Arc<dyn ChainRepository>,
        time_service: Arc<dyn TimeService>,
        context: ExchangeContext,
    ) -> Self {
        let finder = SbsSwapFinder::new(
            pair_repository.clone(),
            time_service.clone(),
            config.swap.fee_percent,
            config.swap.price_freshness_secs,
        );
        let validator = SwapValidator::new(
            pair_repository.clone(),
            time_service.clone(),
            config.swap.min_percent,
            config.swap.price_freshness_secs,
        );
        let executor = SwapExecutor::new(
            context.action_repository,
            pair_repository,
            chain_repository.clone(),
            context.balance_provider,
            context.exchange,
            time_service.clone(),
            context.order_updater,
            config.execution.clone(),
        );

        Self {
            finder,
            builder: SwapChainBuilder::new(),
            validator,
            executor,
            chain_repository,
            time_service,
        }
    }

    /// Service running against the paper exchange with in-memory storage
    pub fn paper(
        config: &BotConfig,
        pair_repository: Arc<dyn PairRepository>,
        time_service: Arc<dyn TimeService>,
    ) -> (Self, Arc<PaperExchange>) {
        let exchange = Arc::new(PaperExchange::new(
            pair_repository.clone(),
            config.paper.balances.clone(),
            config.paper.fill_after_polls,
        ));
        let context = ExchangeContext {
            balance_provider: exchange.clone(),
            exchange: exchange.clone(),
            action_repository: Arc::new(InMemoryActionRepository::new()),
            order_updater: Arc::new(InMemoryOrderUpdater::new()),
        };
        let service = Self::new(
            config,
            pair_repository,
            Arc::new(InMemoryChainRepository::new()),
            time_service,
            context,
        );
        (service, exchange)
    }

    /// Find the best chain for `asset`, store it and cache it for the next swap
    pub async fn discover(&self, asset: &str) -> Result<Discovery, SwapError> {
        let result = self.finder.find(asset).await?;
        let best = match result.best_chain.clone() {
            Some(best) => best,
            None => {
                info!("No swap chain found for {}", asset);
                return Ok(Discovery { result, chain: None });
            }
        };

        let now = self.time_service.now();
        let existing = self.chain_repository.get_chain_by_hash(&best.hash()).await?;
        let statistics = existing
            .as_ref()
            .map(|chain| chain.statistics.clone())
            .unwrap_or_else(ChainStatistics::default)
            .observe(best.percent, now);

        let mut chain = self
            .builder
            .build_entity(&best, best.percent, statistics, existing.as_ref(), now)?;

        if existing.is_some() {
            self.chain_repository.update_chain(&chain).await?;
        } else {
            let id = self.chain_repository.create_chain(&chain).await?;
            chain.id = Some(id);
            info!("Stored new swap chain #{}: {}", id, chain.title);
        }
        self.chain_repository.cache_chain(asset, &chain).await;

        Ok(Discovery {
            result,
            chain: Some(chain),
        })
    }

    /// Swap the order's quantity through the cached chain of its asset
    pub async fn swap(&self, order: &Order) -> Result<SwapAction, SwapError> {
        self.swap_with(order, CancelToken::new()).await
    }

    /// Swap that stops at the next fill poll once `token` is cancelled
    pub async fn swap_with(&self, order: &Order, token: CancelToken) -> Result<SwapAction, SwapError> {
        let chain = self
            .chain_repository
            .get_cached_chain(&order.asset)
            .await
            .ok_or_else(|| SwapError::ChainNotFound(format!("no cached chain for {}", order.asset)))?;

        if let Err(err) = self.validator.validate(&chain, order).await {
            warn!("Chain {} rejected for order #{}: {}", chain.title, order.id, err);
            return Err(err);
        }

        self.executor.execute_with(order, &chain, token).await
    }

    pub async fn action(&self, id: i64) -> Result<SwapAction, SwapError> {
        self.executor.action(id).await
    }

    pub async fn chains(&self) -> Result<Vec<SwapChainEntity>, SwapError> {
        Ok(self.chain_repository.get_chains().await?)
    }

    /// Abort the running swap of `order_id` at its next fill poll
    pub fn cancel(&self, order_id: i64) -> bool {
        self.executor.cancel(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use crate::domain::execution::SwapActionStatus;
    use crate::domain::pair::TradingPair;
    use crate::infrastructure::memory::{InMemoryPairRepository, ManualTimeService};

    const NOW: i64 = 1_700_000_000;

    fn pair(symbol: &str, base: &str, quote: &str, price: f64, step: f64, tick: f64) -> TradingPair {
        TradingPair {
            symbol: symbol.to_string(),
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
            last_price: price,
            price_timestamp: NOW,
            min_quantity: step,
            max_quantity: 0.0,
            min_price: tick,
            quantity_step: step,
            price_tick: tick,
        }
    }

    fn setup(min_percent: f64) -> (SwapChainService, Arc<PaperExchange>, Arc<InMemoryPairRepository>) {
        let pairs = Arc::new(InMemoryPairRepository::new(vec![
            pair("ETHBTC", "ETH", "BTC", 0.05358, 0.001, 0.00001),
            pair("XRPBTC", "XRP", "BTC", 0.00001428, 1.0, 0.00000001),
            pair("XRPETH", "XRP", "ETH", 0.0002775, 1.0, 0.0000001),
        ]));
        let mut config = BotConfig::default();
        config.swap.min_percent = min_percent;
        config.paper.balances = HashMap::from([("ETH".to_string(), 100.0)]);

        let (service, exchange) =
            SwapChainService::paper(&config, pairs.clone(), Arc::new(ManualTimeService::new(NOW)));
        (service, exchange, pairs)
    }

    fn order() -> Order {
        Order {
            id: 1,
            bot_id: 1,
            symbol: "ETHUSDT".to_string(),
            asset: "ETH".to_string(),
            executed_quantity: 100.0,
            swap_action_id: None,
        }
    }

    #[tokio::test]
    async fn test_discover_is_idempotent() {
        let (service, _, pairs) = setup(0.1);

        let first = service.discover("ETH").await.unwrap().chain.unwrap();
        assert_eq!(first.id, Some(1));
        assert_eq!(first.percent.value(), 3.5);

        pairs.update_price("ETHBTC", 0.0535, NOW).await.unwrap();
        let second = service.discover("ETH").await.unwrap().chain.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.hash, first.hash);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.percent.value() < first.percent.value());
        assert_eq!(second.statistics.max_percent.value(), 3.5);
        assert_eq!(second.statistics.last_percent, second.percent);
        assert_eq!(service.chains().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_discover_without_chain() {
        let (service, _, _) = setup(0.1);
        let discovery = service.discover("XRP").await.unwrap();
        assert!(discovery.chain.is_none());
        assert!(discovery.result.chains.is_empty());
    }

    #[tokio::test]
    async fn test_swap_requires_cached_chain() {
        let (service, _, _) = setup(0.1);
        let result = service.swap(&order()).await;
        assert!(matches!(result, Err(SwapError::ChainNotFound(_))));
    }

    #[tokio::test]
    async fn test_discover_then_swap() {
        let (service, exchange, _) = setup(0.1);
        service.discover("ETH").await.unwrap();

        let action = service.swap(&order()).await.unwrap();

        assert_eq!(action.status, SwapActionStatus::Success);
        assert_eq!(action.end_quantity, Some(104.12077500000001));
        assert_eq!(exchange.placed_orders().await.len(), 3);
        assert_eq!(service.action(action.id.unwrap()).await.unwrap(), action);
        assert!((exchange.balances().await["ETH"] - 104.120775).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancelled_swap_leaves_service_usable() {
        let (service, exchange, _) = setup(0.1);
        service.discover("ETH").await.unwrap();
        assert!(!service.cancel(1));

        let token = CancelToken::new();
        token.cancel();
        let cancelled = service.swap_with(&order(), token).await;
        assert_eq!(cancelled.unwrap_err(), SwapError::Cancelled);

        let mut next = order();
        next.id = 2;
        let action = service.swap(&next).await.unwrap();

        assert_eq!(action.status, SwapActionStatus::Success);
        assert_eq!(exchange.cancelled_orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_swap_below_threshold_places_nothing() {
        let (service, exchange, _) = setup(5.0);
        service.discover("ETH").await.unwrap();

        let result = service.swap(&order()).await;
        assert!(matches!(result, Err(SwapError::BelowThreshold { .. })));
        assert!(exchange.placed_orders().await.is_empty());
    }
}
