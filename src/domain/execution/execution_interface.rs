//! Collaborators the executor drives

use async_trait::async_trait;
use crate::domain::swap::OrderSide;
use crate::shared::errors::{ExchangeError, RepositoryError};
use super::{ExchangeOrder, Order, SwapAction, TimeInForce};

/// Storage for swap actions
#[async_trait]
pub trait ActionRepository: Send + Sync {
    /// Pending or in-progress action of the order, if any
    async fn get_active_action(&self, order: &Order) -> Result<Option<SwapAction>, RepositoryError>;

    /// Most recent action of the order regardless of status
    async fn get_action_by_order(&self, order: &Order) -> Result<Option<SwapAction>, RepositoryError>;

    async fn get_action_by_id(&self, id: i64) -> Result<Option<SwapAction>, RepositoryError>;

    /// Persists a new action and returns its id
    async fn create_action(&self, action: &SwapAction) -> Result<i64, RepositoryError>;

    async fn update_action(&self, action: &SwapAction) -> Result<(), RepositoryError>;
}

/// Account balances per asset
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn get_balance(&self, asset: &str, use_cache: bool) -> Result<f64, ExchangeError>;

    async fn invalidate_cache(&self, asset: &str);
}

/// Spot order API of the exchange
#[async_trait]
pub trait ExchangeOrderApi: Send + Sync {
    async fn place_limit_order(
        &self,
        symbol: &str,
        quantity: f64,
        price: f64,
        side: OrderSide,
        time_in_force: TimeInForce,
    ) -> Result<ExchangeOrder, ExchangeError>;

    async fn query_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError>;
}

/// Clock and poll pacing
#[async_trait]
pub trait TimeService: Send + Sync {
    async fn wait_seconds(&self, seconds: u64);

    /// Unix time in seconds
    fn now(&self) -> i64;
}

/// Receives the realized outcome of the originating order
#[async_trait]
pub trait OrderUpdater: Send + Sync {
    async fn update(&self, order: &Order) -> Result<(), RepositoryError>;
}
