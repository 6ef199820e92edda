//! Paper exchange: limit orders reserve their funds when placed, fill after a
//! configurable number of status polls and credit the pair's other asset.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::execution::{
    BalanceProvider, ExchangeOrder, ExchangeOrderApi, ExchangeOrderStatus, TimeInForce,
};
use crate::domain::pair::PairRepository;
use crate::domain::swap::OrderSide;
use crate::shared::errors::ExchangeError;
use crate::shared::utils::generate_id;

const BALANCE_EPSILON: f64 = 1e-9;

struct PaperOrder {
    order: ExchangeOrder,
    base_asset: String,
    quote_asset: String,
    polls: u32,
}

#[derive(Default)]
struct PaperState {
    next_order_id: i64,
    orders: HashMap<i64, PaperOrder>,
    balances: HashMap<String, f64>,
    cached: HashMap<String, f64>,
    placed: Vec<ExchangeOrder>,
    cancelled: Vec<i64>,
    invalidated: Vec<String>,
    rejected_symbols: HashSet<String>,
    held_symbols: HashSet<String>,
    failing_queries: u32,
}

pub struct PaperExchange {
    pair_repository: Arc<dyn PairRepository>,
    fill_after_polls: u32,
    state: RwLock<PaperState>,
}

impl PaperExchange {
    pub fn new(
        pair_repository: Arc<dyn PairRepository>,
        balances: HashMap<String, f64>,
        fill_after_polls: u32,
    ) -> Self {
        Self {
            pair_repository,
            fill_after_polls,
            state: RwLock::new(PaperState {
                next_order_id: 1,
                balances,
                ..PaperState::default()
            }),
        }
    }

    /// Id given to the next placed order
    pub async fn set_next_order_id(&self, id: i64) {
        self.state.write().await.next_order_id = id;
    }

    /// Reject every order placed on `symbol`
    pub async fn reject_symbol(&self, symbol: &str) {
        self.state.write().await.rejected_symbols.insert(symbol.to_string());
    }

    /// Orders on `symbol` stay NEW until cancelled
    pub async fn hold_symbol(&self, symbol: &str) {
        self.state.write().await.held_symbols.insert(symbol.to_string());
    }

    /// Fail the next `count` status queries with a network error
    pub async fn fail_queries(&self, count: u32) {
        self.state.write().await.failing_queries = count;
    }

    pub async fn set_balance(&self, asset: &str, amount: f64) {
        self.state.write().await.balances.insert(asset.to_string(), amount);
    }

    pub async fn placed_orders(&self) -> Vec<ExchangeOrder> {
        self.state.read().await.placed.clone()
    }

    pub async fn cancelled_orders(&self) -> Vec<i64> {
        self.state.read().await.cancelled.clone()
    }

    pub async fn invalidated_assets(&self) -> Vec<String> {
        self.state.read().await.invalidated.clone()
    }

    pub async fn balances(&self) -> HashMap<String, f64> {
        self.state.read().await.balances.clone()
    }

    /// Asset and amount an order spends, and asset and amount it receives
    fn flows(paper: &PaperOrder) -> ((&String, f64), (&String, f64)) {
        let quantity = paper.order.orig_qty;
        let notional = quantity * paper.order.price;
        match paper.order.side {
            OrderSide::Sell => ((&paper.base_asset, quantity), (&paper.quote_asset, notional)),
            OrderSide::Buy => ((&paper.quote_asset, notional), (&paper.base_asset, quantity)),
        }
    }

    /// Credit what a filled order bought; its spend was reserved at placement
    fn settle(balances: &mut HashMap<String, f64>, paper: &PaperOrder) {
        let (_, (received, amount)) = Self::flows(paper);
        *balances.entry(received.clone()).or_insert(0.0) += amount;
    }

    /// Return the reservation of a cancelled order
    fn release(balances: &mut HashMap<String, f64>, paper: &PaperOrder) {
        let ((spent, amount), _) = Self::flows(paper);
        *balances.entry(spent.clone()).or_insert(0.0) += amount;
    }
}

#[async_trait]
impl ExchangeOrderApi for PaperExchange {
    async fn place_limit_order(
        &self,
        symbol: &str,
        quantity: f64,
        price: f64,
        side: OrderSide,
        time_in_force: TimeInForce,
    ) -> Result<ExchangeOrder, ExchangeError> {
        let pair = self
            .pair_repository
            .get_pair_by_symbol(symbol)
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?
            .ok_or_else(|| ExchangeError::Rejected(format!("unknown symbol {}", symbol)))?;

        let mut state = self.state.write().await;
        if state.rejected_symbols.contains(symbol) {
            return Err(ExchangeError::Rejected(format!("trading disabled on {}", symbol)));
        }
        if quantity <= 0.0 || price <= 0.0 {
            return Err(ExchangeError::Rejected(format!(
                "invalid quantity {} or price {}",
                quantity, price
            )));
        }

        let (asset, required) = match side {
            OrderSide::Sell => (&pair.base_asset, quantity),
            OrderSide::Buy => (&pair.quote_asset, quantity * price),
        };
        let available = state.balances.get(asset).copied().unwrap_or_default();
        if available + BALANCE_EPSILON < required {
            return Err(ExchangeError::Rejected(format!(
                "insufficient {} balance: {} < {}",
                asset, available, required
            )));
        }

        // open orders lock their funds until filled or cancelled
        state.balances.insert(asset.clone(), (available - required).max(0.0));

        let order_id = state.next_order_id;
        state.next_order_id += 1;

        let order = ExchangeOrder {
            order_id,
            client_order_id: generate_id(),
            symbol: symbol.to_string(),
            side,
            status: ExchangeOrderStatus::New,
            price,
            orig_qty: quantity,
            executed_qty: 0.0,
        };
        info!(
            "Paper {} {} {} @ {} ({}) -> order #{}",
            side,
            quantity,
            symbol,
            price,
            time_in_force.as_str(),
            order_id
        );

        state.placed.push(order.clone());
        state.orders.insert(
            order_id,
            PaperOrder {
                order: order.clone(),
                base_asset: pair.base_asset,
                quote_asset: pair.quote_asset,
                polls: 0,
            },
        );
        Ok(order)
    }

    async fn query_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(ExchangeError::NetworkError("connection reset".to_string()));
        }

        let held = state.held_symbols.contains(symbol);
        let paper = state
            .orders
            .get_mut(&order_id)
            .filter(|p| p.order.symbol == symbol)
            .ok_or_else(|| ExchangeError::OrderNotFound {
                symbol: symbol.to_string(),
                order_id,
            })?;

        if paper.order.status == ExchangeOrderStatus::Filled
            || paper.order.status.is_closed_unfilled()
            || held
        {
            return Ok(paper.order.clone());
        }

        paper.polls += 1;
        if paper.polls > self.fill_after_polls {
            paper.order.status = ExchangeOrderStatus::Filled;
            paper.order.executed_qty = paper.order.orig_qty;
            Self::settle(&mut state.balances, paper);
            debug!("Paper order #{} filled", order_id);
        } else {
            paper.order.status = ExchangeOrderStatus::PartiallyFilled;
            paper.order.executed_qty = paper.order.orig_qty / 2.0;
        }

        Ok(paper.order.clone())
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let paper = state
            .orders
            .get_mut(&order_id)
            .filter(|p| p.order.symbol == symbol)
            .ok_or_else(|| ExchangeError::OrderNotFound {
                symbol: symbol.to_string(),
                order_id,
            })?;

        if paper.order.status == ExchangeOrderStatus::Filled {
            warn!("Paper order #{} already filled, nothing to cancel", order_id);
            return Ok(paper.order.clone());
        }
        if paper.order.status.is_closed_unfilled() {
            return Ok(paper.order.clone());
        }

        // partial fills are dropped: the paper book only settles whole orders
        paper.order.status = ExchangeOrderStatus::Canceled;
        paper.order.executed_qty = 0.0;
        let order = paper.order.clone();
        Self::release(&mut state.balances, paper);
        state.cancelled.push(order_id);
        Ok(order)
    }
}

#[async_trait]
impl BalanceProvider for PaperExchange {
    async fn get_balance(&self, asset: &str, use_cache: bool) -> Result<f64, ExchangeError> {
        let mut state = self.state.write().await;
        if use_cache {
            if let Some(cached) = state.cached.get(asset) {
                return Ok(*cached);
            }
        }

        let balance = state.balances.get(asset).copied().unwrap_or_default();
        state.cached.insert(asset.to_string(), balance);
        Ok(balance)
    }

    async fn invalidate_cache(&self, asset: &str) {
        let mut state = self.state.write().await;
        state.cached.remove(asset);
        state.invalidated.push(asset.to_string());
    }
}
