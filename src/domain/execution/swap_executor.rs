//! Three-leg swap executor with fill polling and crash-recoverable checkpoints

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::domain::pair::{PairRepository, TradingPair};
use crate::domain::swap::{check_chain_consistency, ChainRepository, Formatter, OrderSide, SwapChainEntity};
use crate::shared::errors::SwapError;
use crate::shared::types::ExecutionConfig;
use crate::shared::utils::KeyedLocks;
use super::{
    ActionRepository, BalanceProvider, ExchangeOrder, ExchangeOrderApi, ExchangeOrderStatus, Order,
    OrderUpdater, SwapAction, SwapActionLeg, SwapActionStatus, TimeInForce, TimeService,
};

const LEG_NAMES: [&str; 3] = ["one", "two", "three"];

/// Abort signal of one execution, checked at every fill poll
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives the three orders of a chain to completion
pub struct SwapExecutor {
    action_repository: Arc<dyn ActionRepository>,
    pair_repository: Arc<dyn PairRepository>,
    chain_repository: Arc<dyn ChainRepository>,
    balance_provider: Arc<dyn BalanceProvider>,
    exchange: Arc<dyn ExchangeOrderApi>,
    time_service: Arc<dyn TimeService>,
    order_updater: Arc<dyn OrderUpdater>,
    formatter: Formatter,
    config: ExecutionConfig,
    order_locks: KeyedLocks,
    asset_locks: KeyedLocks,
    /// Tokens of the executions in flight, by order id
    running: Mutex<HashMap<i64, CancelToken>>,
}

impl SwapExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        action_repository: Arc<dyn ActionRepository>,
        pair_repository: Arc<dyn PairRepository>,
        chain_repository: Arc<dyn ChainRepository>,
        balance_provider: Arc<dyn BalanceProvider>,
        exchange: Arc<dyn ExchangeOrderApi>,
        time_service: Arc<dyn TimeService>,
        order_updater: Arc<dyn OrderUpdater>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            action_repository,
            pair_repository,
            chain_repository,
            balance_provider,
            exchange,
            time_service,
            order_updater,
            formatter: Formatter::new(),
            config,
            order_locks: KeyedLocks::new(),
            asset_locks: KeyedLocks::new(),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Abort the running execution of `order_id` at its next poll.
    /// Returns false when nothing is running for that order.
    pub fn cancel(&self, order_id: i64) -> bool {
        match self.running_tokens().get(&order_id) {
            Some(token) => {
                info!("Cancelling swap of order #{}", order_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Abort every execution in flight; later executions are unaffected
    pub fn cancel_all(&self) -> usize {
        let running = self.running_tokens();
        for token in running.values() {
            token.cancel();
        }
        running.len()
    }

    fn running_tokens(&self) -> MutexGuard<'_, HashMap<i64, CancelToken>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn action(&self, id: i64) -> Result<SwapAction, SwapError> {
        self.action_repository
            .get_action_by_id(id)
            .await?
            .ok_or_else(|| SwapError::ActionNotFound(id.to_string()))
    }

    /// Run `chain` for `order`, or resume/return the action the order already has
    pub async fn execute(&self, order: &Order, chain: &SwapChainEntity) -> Result<SwapAction, SwapError> {
        self.execute_with(order, chain, CancelToken::new()).await
    }

    /// Like [`execute`](Self::execute), aborted at the next poll once `token` is cancelled
    pub async fn execute_with(
        &self,
        order: &Order,
        chain: &SwapChainEntity,
        token: CancelToken,
    ) -> Result<SwapAction, SwapError> {
        let _order_guard = self.order_locks.lock(&order.id.to_string()).await;

        self.running_tokens().insert(order.id, token.clone());
        let result = self.run(order, chain, &token).await;
        self.running_tokens().remove(&order.id);
        result
    }

    async fn run(
        &self,
        order: &Order,
        chain: &SwapChainEntity,
        token: &CancelToken,
    ) -> Result<SwapAction, SwapError> {
        let mut action = match self.action_repository.get_active_action(order).await? {
            Some(active) => {
                info!(
                    "Resuming swap action #{} for order #{} ({:?})",
                    active.id.unwrap_or_default(),
                    order.id,
                    active.status
                );
                self.check_resumed_chain(&active, chain).await?;
                active
            }
            None => match self.action_repository.get_action_by_order(order).await? {
                Some(finished) => {
                    info!(
                        "Order #{} already swapped by action #{} ({:?})",
                        order.id,
                        finished.id.unwrap_or_default(),
                        finished.status
                    );
                    return Ok(finished);
                }
                None => self.create_action(order, chain).await?,
            },
        };

        if action.status == SwapActionStatus::Pending {
            action.status = SwapActionStatus::InProgress;
            self.persist(&action).await?;
        }

        let mut input = action.start_quantity;
        for index in 0..LEG_NAMES.len() {
            match self.run_leg(&mut action, index, input, token).await {
                Ok(output) => input = output,
                Err(err) => return Err(self.fail(&mut action, index, err).await),
            }
        }

        self.finish(order, &mut action, input).await?;
        Ok(action)
    }

    /// The action's stored chain must still be the one the caller runs
    async fn check_resumed_chain(&self, action: &SwapAction, chain: &SwapChainEntity) -> Result<(), SwapError> {
        let stored = self
            .chain_repository
            .get_chain_by_id(action.swap_chain_id)
            .await?
            .ok_or_else(|| SwapError::ChainNotFound(format!("swap chain #{}", action.swap_chain_id)))?;

        if stored.hash != chain.hash {
            error!(
                "Swap action #{} belongs to chain {} but {} was given",
                action.id.unwrap_or_default(),
                stored.title,
                chain.title
            );
            return Err(SwapError::InconsistentChain(format!(
                "action #{} runs chain #{} ({}), not {}",
                action.id.unwrap_or_default(),
                action.swap_chain_id,
                stored.hash,
                chain.hash
            )));
        }
        check_chain_consistency(stored.legs())
    }

    async fn create_action(&self, order: &Order, chain: &SwapChainEntity) -> Result<SwapAction, SwapError> {
        check_chain_consistency(chain.legs()).map_err(|err| {
            error!("Refusing to execute chain {}: {}", chain.title, err);
            err
        })?;
        let chain_id = chain
            .id
            .ok_or_else(|| SwapError::ChainNotFound(format!("{} is not persisted", chain.hash)))?;

        let asset = chain.asset();
        let balance = self.balance_provider.get_balance(asset, false).await?;
        let start_quantity = order.executed_quantity.min(balance);

        let mut action = SwapAction::pending(order, chain_id, chain, start_quantity, self.time_service.now());
        let id = self.action_repository.create_action(&action).await?;
        action.id = Some(id);

        info!(
            "Created swap action #{} for order #{}: {} {} via {}",
            id, order.id, start_quantity, asset, chain.title
        );
        Ok(action)
    }

    /// Execute (or resume) one leg and return the amount of its output asset
    async fn run_leg(
        &self,
        action: &mut SwapAction,
        index: usize,
        input: f64,
        token: &CancelToken,
    ) -> Result<f64, SwapError> {
        let leg = action.leg(index).clone();

        if leg.is_filled() {
            let quantity = leg.quantity.unwrap_or_default();
            debug!("Leg {} ({}) already filled, skipping", LEG_NAMES[index], leg.symbol);
            return Ok(leg.filled_output(quantity));
        }

        let pair = self
            .pair_repository
            .get_pair_by_symbol(&leg.symbol)
            .await?
            .ok_or_else(|| SwapError::PairNotFound(leg.symbol.clone()))?;

        let (order_id, quantity) = match (leg.external_id, leg.quantity) {
            (Some(order_id), Some(quantity)) => {
                info!("Leg {} order #{} already placed, polling", LEG_NAMES[index], order_id);
                (order_id, quantity)
            }
            _ => self.place_leg(action, index, &pair, input).await?,
        };

        let result = self.wait_for_fill(action.leg_mut(index), order_id, token).await;
        // the last known exchange status is kept even when the fill failed
        self.persist(action).await?;
        let filled = result?;

        let leg = action.leg(index);
        info!(
            "Leg {} {} {} {} @ {} filled (order #{})",
            LEG_NAMES[index], leg.side, quantity, leg.symbol, leg.price, filled.order_id
        );
        Ok(leg.filled_output(quantity))
    }

    async fn place_leg(
        &self,
        action: &mut SwapAction,
        index: usize,
        pair: &TradingPair,
        input: f64,
    ) -> Result<(i64, f64), SwapError> {
        let leg = action.leg(index).clone();
        let input_asset = match leg.side {
            OrderSide::Sell => &pair.base_asset,
            OrderSide::Buy => &pair.quote_asset,
        };

        let _asset_guard = self.asset_locks.lock(input_asset).await;

        let balance = self.balance_provider.get_balance(input_asset, false).await?;
        let available = input.min(balance);
        let price = self.formatter.round_price(pair, leg.price);
        let quantity = match leg.side {
            OrderSide::Sell => self.formatter.round_quantity(pair, available),
            OrderSide::Buy => self.formatter.round_quantity(pair, available / price),
        };

        if !pair.is_quantity_allowed(quantity) {
            return Err(SwapError::QuantityOutOfRange {
                symbol: pair.symbol.clone(),
                quantity,
                min: pair.min_quantity,
                max: pair.max_quantity,
            });
        }

        debug!(
            "Placing leg {}: {} {} {} @ {} ({} {} available)",
            LEG_NAMES[index], leg.side, quantity, leg.symbol, price, available, input_asset
        );
        let placed = self
            .exchange
            .place_limit_order(&leg.symbol, quantity, price, leg.side, TimeInForce::GoodTilCanceled)
            .await?;

        let now = self.time_service.now();
        let record = action.leg_mut(index);
        record.price = price;
        record.quantity = Some(quantity);
        record.executed_quantity = Some(placed.executed_qty);
        record.external_id = Some(placed.order_id);
        record.external_status = Some(placed.status);
        record.external_timestamp = Some(now);
        // checkpoint: a restart polls this order instead of placing a new one
        self.persist(action).await?;

        Ok((placed.order_id, quantity))
    }

    /// Poll until the order is filled, closed, cancelled or out of attempts
    async fn wait_for_fill(
        &self,
        leg: &mut SwapActionLeg,
        order_id: i64,
        token: &CancelToken,
    ) -> Result<ExchangeOrder, SwapError> {
        self.time_service.wait_seconds(self.config.initial_delay_secs).await;
        let mut current = self.query(leg, order_id).await;
        let mut attempts = 0;

        loop {
            if let Some(order) = &current {
                if order.status == ExchangeOrderStatus::Filled {
                    return Ok(order.clone());
                }
                if order.status.is_closed_unfilled() {
                    return Err(SwapError::ExchangeRejected(format!(
                        "order #{} on {} ended as {}",
                        order_id, leg.symbol, order.status
                    )));
                }
            }

            if token.is_cancelled() {
                warn!("Swap cancelled while waiting for {} order #{}", leg.symbol, order_id);
                return match self.cancel_order(leg, order_id).await {
                    Some(order) => Ok(order),
                    None => Err(SwapError::Cancelled),
                };
            }

            attempts += 1;
            if attempts > self.config.max_poll_attempts {
                warn!(
                    "{} order #{} not filled after {} polls",
                    leg.symbol, order_id, self.config.max_poll_attempts
                );
                if self.config.cancel_on_timeout {
                    if let Some(order) = self.cancel_order(leg, order_id).await {
                        return Ok(order);
                    }
                }
                return Err(SwapError::FillTimeout {
                    symbol: leg.symbol.clone(),
                    order_id,
                });
            }

            self.time_service.wait_seconds(self.config.poll_interval_secs).await;
            current = self.query(leg, order_id).await;
        }
    }

    async fn query(&self, leg: &mut SwapActionLeg, order_id: i64) -> Option<ExchangeOrder> {
        match self.exchange.query_order(&leg.symbol, order_id).await {
            Ok(order) => {
                debug!(
                    "{} order #{}: {} ({}/{})",
                    leg.symbol, order_id, order.status, order.executed_qty, order.orig_qty
                );
                leg.external_status = Some(order.status);
                leg.executed_quantity = Some(order.executed_qty);
                leg.external_timestamp = Some(self.time_service.now());
                Some(order)
            }
            Err(err) => {
                warn!("Failed to query {} order #{}: {}", leg.symbol, order_id, err);
                None
            }
        }
    }

    /// Best-effort cancel; returns the order only if it turned out filled
    async fn cancel_order(&self, leg: &mut SwapActionLeg, order_id: i64) -> Option<ExchangeOrder> {
        match self.exchange.cancel_order(&leg.symbol, order_id).await {
            Ok(order) => {
                if order.executed_qty > 0.0 && order.status != ExchangeOrderStatus::Filled {
                    warn!(
                        "{} order #{} cancelled after a partial fill of {}/{}",
                        leg.symbol, order_id, order.executed_qty, order.orig_qty
                    );
                }
                leg.external_status = Some(order.status);
                leg.executed_quantity = Some(order.executed_qty);
                leg.external_timestamp = Some(self.time_service.now());
                (order.status == ExchangeOrderStatus::Filled).then_some(order)
            }
            Err(err) => {
                error!("Failed to cancel {} order #{}: {}", leg.symbol, order_id, err);
                None
            }
        }
    }

    async fn fail(&self, action: &mut SwapAction, index: usize, err: SwapError) -> SwapError {
        action.status = SwapActionStatus::Failed;
        action.end_timestamp = Some(self.time_service.now());
        // a partial fill moved funds into the leg's output asset
        let executed = action.leg(index).has_executed();
        action.stranded_asset = match self.leg_assets(action, index).await {
            Some((_, output)) if executed => Some(output),
            Some((input, _)) if index > 0 => Some(input),
            _ => None,
        };

        error!(
            "Swap action #{} failed on leg {} ({}): {}{}",
            action.id.unwrap_or_default(),
            LEG_NAMES[index],
            action.leg(index).symbol,
            err,
            action
                .stranded_asset
                .as_ref()
                .map(|asset| format!(", funds left in {}", asset))
                .unwrap_or_default()
        );

        if let Err(persist_err) = self.persist(action).await {
            error!("Failed to persist failed swap action: {}", persist_err);
        }
        err
    }

    /// Input and output asset of a leg
    async fn leg_assets(&self, action: &SwapAction, index: usize) -> Option<(String, String)> {
        let leg = action.leg(index);
        let pair = self.pair_repository.get_pair_by_symbol(&leg.symbol).await.ok().flatten()?;
        Some(match leg.side {
            OrderSide::Sell => (pair.base_asset, pair.quote_asset),
            OrderSide::Buy => (pair.quote_asset, pair.base_asset),
        })
    }

    async fn finish(&self, order: &Order, action: &mut SwapAction, end_quantity: f64) -> Result<(), SwapError> {
        action.end_quantity = Some(end_quantity);
        action.end_timestamp = Some(self.time_service.now());
        action.status = SwapActionStatus::Success;
        self.persist(action).await?;

        self.balance_provider.invalidate_cache(&action.asset).await;

        let mut updated = order.clone();
        updated.executed_quantity = end_quantity;
        updated.swap_action_id = action.id;
        if let Err(err) = self.order_updater.update(&updated).await {
            error!("Failed to update order #{} after swap: {}", order.id, err);
        }

        info!(
            "Swap action #{} succeeded: {} {} -> {} {} ({:.4}%)",
            action.id.unwrap_or_default(),
            action.start_quantity,
            action.asset,
            end_quantity,
            action.asset,
            self.formatter.percent(action.start_quantity, end_quantity)
        );

        if self.config.reconcile_balance {
            self.reconcile(action, end_quantity).await;
        }
        Ok(())
    }

    /// Compare the live balance with the computed result; logging only
    async fn reconcile(&self, action: &SwapAction, end_quantity: f64) {
        match self.balance_provider.get_balance(&action.asset, false).await {
            Ok(balance) if balance + 1e-9 < end_quantity => warn!(
                "{} balance {} is below computed swap result {}",
                action.asset, balance, end_quantity
            ),
            Ok(balance) => debug!("{} balance after swap: {}", action.asset, balance),
            Err(err) => warn!("Failed to read {} balance after swap: {}", action.asset, err),
        }
    }

    async fn persist(&self, action: &SwapAction) -> Result<(), SwapError> {
        self.action_repository.update_action(action).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::domain::swap::{chain_hash, ChainStatistics, Percent, SwapLeg, CHAIN_TYPE_SBS};
    use crate::infrastructure::memory::{
        InMemoryActionRepository, InMemoryChainRepository, InMemoryOrderUpdater, InMemoryPairRepository,
        ManualTimeService,
    };
    use crate::infrastructure::paper::PaperExchange;
    use crate::shared::errors::ExchangeError;

    const NOW: i64 = 1_700_000_000;
    const END_QUANTITY: f64 = 104.12077500000001;

    struct Harness {
        executor: SwapExecutor,
        actions: Arc<InMemoryActionRepository>,
        exchange: Arc<PaperExchange>,
        clock: Arc<ManualTimeService>,
        orders: Arc<InMemoryOrderUpdater>,
    }

    fn pair(symbol: &str, base: &str, quote: &str, price: f64, step: f64, tick: f64) -> TradingPair {
        TradingPair {
            symbol: symbol.to_string(),
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
            last_price: price,
            price_timestamp: NOW + 3600,
            min_quantity: step,
            max_quantity: 0.0,
            min_price: tick,
            quantity_step: step,
            price_tick: tick,
        }
    }

    fn pairs() -> Vec<TradingPair> {
        vec![
            pair("ETHBTC", "ETH", "BTC", 0.05358, 0.001, 0.00001),
            pair("XRPBTC", "XRP", "BTC", 0.00001428, 1.0, 0.00000001),
            pair("XRPETH", "XRP", "ETH", 0.0002775, 1.0, 0.0000001),
        ]
    }

    fn chain() -> SwapChainEntity {
        let pairs = pairs();
        let swap_one = SwapLeg::from_pair(&pairs[0], OrderSide::Sell);
        let swap_two = SwapLeg::from_pair(&pairs[1], OrderSide::Buy);
        let swap_three = SwapLeg::from_pair(&pairs[2], OrderSide::Sell);
        SwapChainEntity {
            id: Some(1),
            title: "ETH sell-> BTC buy-> XRP sell-> ETH".to_string(),
            chain_type: CHAIN_TYPE_SBS.to_string(),
            hash: chain_hash(CHAIN_TYPE_SBS, [&swap_one, &swap_two, &swap_three]),
            swap_one,
            swap_two,
            swap_three,
            percent: Percent::from(3.5),
            statistics: ChainStatistics::default(),
            created_at: NOW,
            updated_at: NOW,
        }
    }

    fn order() -> Order {
        order_of(7, 100.0)
    }

    fn order_of(id: i64, quantity: f64) -> Order {
        Order {
            id,
            bot_id: 1,
            symbol: "ETHUSDT".to_string(),
            asset: "ETH".to_string(),
            executed_quantity: quantity,
            swap_action_id: None,
        }
    }

    /// Paper book whose orders on one symbol stop at a partial fill
    struct PartialFillExchange {
        paper: Arc<PaperExchange>,
        symbol: String,
        executed: f64,
    }

    impl PartialFillExchange {
        fn partial(&self, mut order: ExchangeOrder) -> ExchangeOrder {
            if order.symbol == self.symbol && order.status != ExchangeOrderStatus::Filled {
                if order.status == ExchangeOrderStatus::New {
                    order.status = ExchangeOrderStatus::PartiallyFilled;
                }
                order.executed_qty = self.executed;
            }
            order
        }
    }

    #[async_trait]
    impl ExchangeOrderApi for PartialFillExchange {
        async fn place_limit_order(
            &self,
            symbol: &str,
            quantity: f64,
            price: f64,
            side: OrderSide,
            time_in_force: TimeInForce,
        ) -> Result<ExchangeOrder, ExchangeError> {
            self.paper.place_limit_order(symbol, quantity, price, side, time_in_force).await
        }

        async fn query_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError> {
            Ok(self.partial(self.paper.query_order(symbol, order_id).await?))
        }

        async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError> {
            Ok(self.partial(self.paper.cancel_order(symbol, order_id).await?))
        }
    }

    fn harness_with(config: ExecutionConfig, balances: HashMap<String, f64>) -> Harness {
        harness_over(config, balances, |paper| paper as Arc<dyn ExchangeOrderApi>)
    }

    /// Harness whose order API is built on top of the paper exchange
    fn harness_over<F>(config: ExecutionConfig, balances: HashMap<String, f64>, order_api: F) -> Harness
    where
        F: FnOnce(Arc<PaperExchange>) -> Arc<dyn ExchangeOrderApi>,
    {
        let pair_repository = Arc::new(InMemoryPairRepository::new(pairs()));
        let chains = Arc::new(InMemoryChainRepository::with_chains(vec![chain()]));
        let actions = Arc::new(InMemoryActionRepository::new());
        let exchange = Arc::new(PaperExchange::new(pair_repository.clone(), balances, 1));
        let clock = Arc::new(ManualTimeService::new(NOW));
        let orders = Arc::new(InMemoryOrderUpdater::new());

        let executor = SwapExecutor::new(
            actions.clone(),
            pair_repository,
            chains,
            exchange.clone(),
            order_api(exchange.clone()),
            clock.clone(),
            orders.clone(),
            config,
        );

        Harness {
            executor,
            actions,
            exchange,
            clock,
            orders,
        }
    }

    fn harness() -> Harness {
        harness_with(
            ExecutionConfig::default(),
            HashMap::from([("ETH".to_string(), 100.0)]),
        )
    }

    #[tokio::test]
    async fn test_execute_sell_buy_sell() {
        let h = harness();
        h.exchange.set_next_order_id(12).await;

        let action = h.executor.execute(&order(), &chain()).await.unwrap();

        assert_eq!(action.status, SwapActionStatus::Success);
        assert_eq!(action.start_quantity, 100.0);
        assert_eq!(action.end_quantity, Some(END_QUANTITY));
        assert_eq!(action.swap_chain_id, 1);
        assert_eq!(action.asset, "ETH");
        assert!(action.stranded_asset.is_none());

        let placed = h.exchange.placed_orders().await;
        let summary: Vec<_> = placed
            .iter()
            .map(|o| (o.symbol.as_str(), o.orig_qty, o.price, o.side))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("ETHBTC", 100.0, 0.05358, OrderSide::Sell),
                ("XRPBTC", 375210.0, 0.00001428, OrderSide::Buy),
                ("XRPETH", 375210.0, 0.0002775, OrderSide::Sell),
            ]
        );

        let ids: Vec<_> = action.legs().iter().map(|leg| leg.external_id).collect();
        assert_eq!(ids, vec![Some(12), Some(13), Some(14)]);
        assert!(action.legs().iter().all(|leg| leg.is_filled()));
        let executed: Vec<_> = action.legs().iter().map(|leg| leg.executed_quantity).collect();
        assert_eq!(executed, vec![Some(100.0), Some(375210.0), Some(375210.0)]);
        assert_eq!(h.clock.waits(), vec![5, 7, 5, 7, 5, 7]);

        let updates = h.orders.updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].executed_quantity, END_QUANTITY);
        assert_eq!(updates[0].swap_action_id, action.id);
        assert_eq!(h.exchange.invalidated_assets().await, vec!["ETH".to_string()]);

        let stored = h.executor.action(action.id.unwrap()).await.unwrap();
        assert_eq!(stored, action);
        assert_eq!(h.executor.action(99).await, Err(SwapError::ActionNotFound("99".to_string())));
    }

    #[tokio::test]
    async fn test_start_quantity_capped_by_balance() {
        let h = harness_with(
            ExecutionConfig::default(),
            HashMap::from([("ETH".to_string(), 40.0)]),
        );

        let action = h.executor.execute(&order(), &chain()).await.unwrap();

        assert_eq!(action.start_quantity, 40.0);
        assert_eq!(h.exchange.placed_orders().await[0].orig_qty, 40.0);
    }

    #[tokio::test]
    async fn test_first_leg_rejection_fails_without_stranding() {
        let h = harness();
        h.exchange.reject_symbol("ETHBTC").await;

        let result = h.executor.execute(&order(), &chain()).await;
        assert!(matches!(result, Err(SwapError::ExchangeRejected(_))));

        let stored = h.actions.actions().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, SwapActionStatus::Failed);
        assert!(stored[0].end_timestamp.is_some());
        assert!(stored[0].stranded_asset.is_none());
        assert!(h.exchange.placed_orders().await.is_empty());
        assert!(h.orders.updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_leg_rejection_records_stranded_asset() {
        let h = harness();
        h.exchange.reject_symbol("XRPBTC").await;

        let result = h.executor.execute(&order(), &chain()).await;
        assert!(result.is_err());

        let stored = h.actions.actions().await.remove(0);
        assert_eq!(stored.status, SwapActionStatus::Failed);
        assert_eq!(stored.stranded_asset.as_deref(), Some("BTC"));
        assert!(stored.swap_one.is_filled());
        assert!(stored.swap_two.external_id.is_none());
        assert!(stored.swap_three.quantity.is_none());
        assert_eq!(h.exchange.placed_orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unfilled_order_times_out_and_is_cancelled() {
        let config = ExecutionConfig {
            max_poll_attempts: 2,
            ..ExecutionConfig::default()
        };
        let h = harness_with(config, HashMap::from([("ETH".to_string(), 100.0)]));
        h.exchange.hold_symbol("XRPBTC").await;

        let result = h.executor.execute(&order(), &chain()).await;
        assert!(matches!(
            result,
            Err(SwapError::FillTimeout { ref symbol, .. }) if symbol == "XRPBTC"
        ));

        let stored = h.actions.actions().await.remove(0);
        let leg_two_id = stored.swap_two.external_id.unwrap();
        assert_eq!(h.exchange.cancelled_orders().await, vec![leg_two_id]);
        assert_eq!(stored.swap_two.external_status, Some(ExchangeOrderStatus::Canceled));
        assert_eq!(stored.stranded_asset.as_deref(), Some("BTC"));
        // leg one: 5 + 7, leg two: 5 + 7 + 7
        assert_eq!(h.clock.waits(), vec![5, 7, 5, 7, 7]);
    }

    #[tokio::test]
    async fn test_query_errors_consume_poll_attempts() {
        let h = harness();
        h.exchange.fail_queries(2).await;

        let action = h.executor.execute(&order(), &chain()).await.unwrap();

        assert_eq!(action.status, SwapActionStatus::Success);
        assert_eq!(h.clock.waits(), vec![5, 7, 7, 7, 5, 7, 5, 7]);
    }

    #[tokio::test]
    async fn test_cancel_token_aborts_polling() {
        let h = harness();
        h.exchange.hold_symbol("ETHBTC").await;
        let token = CancelToken::new();
        token.cancel();

        let result = h.executor.execute_with(&order(), &chain(), token).await;
        assert_eq!(result.unwrap_err(), SwapError::Cancelled);

        let stored = h.actions.actions().await.remove(0);
        assert_eq!(stored.status, SwapActionStatus::Failed);
        assert!(stored.stranded_asset.is_none());
        assert_eq!(stored.swap_one.executed_quantity, Some(0.0));
        assert_eq!(h.exchange.cancelled_orders().await.len(), 1);
        assert_eq!(h.exchange.balances().await["ETH"], 100.0);
    }

    #[tokio::test]
    async fn test_cancel_applies_to_one_execution_only() {
        let h = harness();
        let token = CancelToken::new();
        token.cancel();

        let cancelled = h.executor.execute_with(&order_of(7, 100.0), &chain(), token).await;
        assert_eq!(cancelled.unwrap_err(), SwapError::Cancelled);

        let next = h.executor.execute(&order_of(8, 100.0), &chain()).await.unwrap();

        assert_eq!(next.status, SwapActionStatus::Success);
        assert_eq!(next.end_quantity, Some(END_QUANTITY));
        assert_eq!(h.exchange.cancelled_orders().await, vec![1]);
        assert_eq!(h.exchange.placed_orders().await.len(), 4);
    }

    #[tokio::test]
    async fn test_cancel_running_order_by_id() {
        let h = harness();
        h.exchange.hold_symbol("ETHBTC").await;
        assert!(!h.executor.cancel(7));

        let cancel = async {
            while !h.executor.cancel(7) {
                tokio::task::yield_now().await;
            }
        };
        let (order, chain) = (order(), chain());
        let (result, _) = futures::join!(h.executor.execute(&order, &chain), cancel);

        assert_eq!(result.unwrap_err(), SwapError::Cancelled);
        assert_eq!(h.exchange.cancelled_orders().await.len(), 1);
        assert!(!h.executor.cancel(7));
        assert_eq!(h.executor.cancel_all(), 0);
    }

    #[tokio::test]
    async fn test_partial_fill_on_timeout_strands_output_asset() {
        let config = ExecutionConfig {
            max_poll_attempts: 2,
            ..ExecutionConfig::default()
        };
        let h = harness_over(config, HashMap::from([("ETH".to_string(), 100.0)]), |paper| {
            Arc::new(PartialFillExchange {
                paper,
                symbol: "ETHBTC".to_string(),
                executed: 80.0,
            }) as Arc<dyn ExchangeOrderApi>
        });
        h.exchange.hold_symbol("ETHBTC").await;

        let result = h.executor.execute(&order(), &chain()).await;
        assert!(matches!(
            result,
            Err(SwapError::FillTimeout { ref symbol, .. }) if symbol == "ETHBTC"
        ));

        let stored = h.actions.actions().await.remove(0);
        assert_eq!(stored.status, SwapActionStatus::Failed);
        assert_eq!(stored.swap_one.external_status, Some(ExchangeOrderStatus::Canceled));
        assert_eq!(stored.swap_one.quantity, Some(100.0));
        assert_eq!(stored.swap_one.executed_quantity, Some(80.0));
        assert_eq!(stored.stranded_asset.as_deref(), Some("BTC"));
        assert_eq!(h.exchange.cancelled_orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_orders_share_asset_balance() {
        let h = harness();
        let chain = chain();
        let (order_a, order_b) = (order_of(7, 60.0), order_of(8, 60.0));

        let (first, second) = futures::join!(
            h.executor.execute(&order_a, &chain),
            h.executor.execute(&order_b, &chain)
        );

        assert_eq!(first.unwrap().status, SwapActionStatus::Success);
        assert_eq!(second.unwrap().status, SwapActionStatus::Success);

        let mut sizes: Vec<_> = h
            .exchange
            .placed_orders()
            .await
            .into_iter()
            .filter(|o| o.symbol == "ETHBTC")
            .map(|o| o.orig_qty)
            .collect();
        sizes.sort_by(f64::total_cmp);
        // the later order is sized from what the earlier one left
        assert_eq!(sizes, vec![40.0, 60.0]);
        assert_eq!(h.actions.actions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_execution_runs_chain_once() {
        let h = harness();
        let (order_a, order_b) = (order(), order());
        let chain = chain();

        let (first, second) = futures::join!(
            h.executor.execute(&order_a, &chain),
            h.executor.execute(&order_b, &chain)
        );

        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, SwapActionStatus::Success);
        assert_eq!(h.exchange.placed_orders().await.len(), 3);
        assert_eq!(h.actions.actions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_finished_action_is_returned_unchanged() {
        let h = harness();
        let first = h.executor.execute(&order(), &chain()).await.unwrap();
        let updates = h.actions.update_count().await;

        let again = h.executor.execute(&order(), &chain()).await.unwrap();

        assert_eq!(again, first);
        assert_eq!(h.actions.update_count().await, updates);
        assert_eq!(h.exchange.placed_orders().await.len(), 3);
    }

    #[tokio::test]
    async fn test_resume_polls_placed_order_without_resubmitting() {
        let h = harness_with(
            ExecutionConfig::default(),
            HashMap::from([("BTC".to_string(), 100.0 * 0.05358)]),
        );

        // state left by a run that crashed after placing leg two
        let placed = h
            .exchange
            .place_limit_order("XRPBTC", 375210.0, 0.00001428, OrderSide::Buy, TimeInForce::GoodTilCanceled)
            .await
            .unwrap();
        let mut action = SwapAction::pending(&order(), 1, &chain(), 100.0, NOW);
        action.status = SwapActionStatus::InProgress;
        action.swap_one.quantity = Some(100.0);
        action.swap_one.external_id = Some(900);
        action.swap_one.external_status = Some(ExchangeOrderStatus::Filled);
        action.swap_two.quantity = Some(375210.0);
        action.swap_two.external_id = Some(placed.order_id);
        action.swap_two.external_status = Some(ExchangeOrderStatus::New);
        let id = h.actions.insert(action).await;

        let resumed = h.executor.execute(&order(), &chain()).await.unwrap();

        assert_eq!(resumed.id, Some(id));
        assert_eq!(resumed.status, SwapActionStatus::Success);
        assert_eq!(resumed.swap_two.external_id, Some(placed.order_id));
        assert_eq!(resumed.end_quantity, Some(END_QUANTITY));

        let symbols: Vec<_> = h
            .exchange
            .placed_orders()
            .await
            .into_iter()
            .map(|o| o.symbol)
            .collect();
        assert_eq!(symbols, vec!["XRPBTC", "XRPETH"]);
        assert_eq!(h.clock.waits(), vec![5, 7, 5, 7]);
    }

    async fn seed_in_progress(h: &Harness, swap_chain_id: i64) -> i64 {
        let mut action = SwapAction::pending(&order(), swap_chain_id, &chain(), 100.0, NOW);
        action.status = SwapActionStatus::InProgress;
        h.actions.insert(action).await
    }

    #[tokio::test]
    async fn test_resume_rejects_chain_mismatch() {
        let h = harness();
        seed_in_progress(&h, 1).await;
        let mut other = chain();
        other.hash = "00000000-0000-5000-8000-000000000000".to_string();

        let result = h.executor.execute(&order(), &other).await;

        assert!(matches!(result, Err(SwapError::InconsistentChain(_))));
        assert!(h.exchange.placed_orders().await.is_empty());
        assert_eq!(h.actions.actions().await.remove(0).status, SwapActionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_resume_requires_stored_chain() {
        let h = harness();
        seed_in_progress(&h, 42).await;

        let result = h.executor.execute(&order(), &chain()).await;

        assert_eq!(result.unwrap_err(), SwapError::ChainNotFound("swap chain #42".to_string()));
        assert!(h.exchange.placed_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_inconsistent_chain_is_refused() {
        let h = harness();
        let mut broken = chain();
        broken.swap_three.quote_asset = "USDT".to_string();

        let result = h.executor.execute(&order(), &broken).await;
        assert!(matches!(result, Err(SwapError::InconsistentChain(_))));
        assert!(h.actions.actions().await.is_empty());
    }
}
