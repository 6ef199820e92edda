//! Execution domain - running a swap chain against the exchange

mod execution_interface;
mod swap_executor;

pub use execution_interface::{ActionRepository, BalanceProvider, ExchangeOrderApi, OrderUpdater, TimeService};
pub use swap_executor::{CancelToken, SwapExecutor};

use std::fmt;

use serde::{Deserialize, Serialize};
use crate::domain::swap::{OrderSide, SwapChainEntity, SwapLeg};

/// Order that triggered the swap; supplies the quantity to swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub bot_id: i64,
    pub symbol: String,
    pub asset: String,
    pub executed_quantity: f64,
    pub swap_action_id: Option<i64>,
}

/// Exchange-side order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeOrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl ExchangeOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeOrderStatus::New => "NEW",
            ExchangeOrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            ExchangeOrderStatus::Filled => "FILLED",
            ExchangeOrderStatus::Canceled => "CANCELED",
            ExchangeOrderStatus::Rejected => "REJECTED",
            ExchangeOrderStatus::Expired => "EXPIRED",
        }
    }

    /// Order left the book without being filled
    pub fn is_closed_unfilled(&self) -> bool {
        matches!(
            self,
            ExchangeOrderStatus::Canceled | ExchangeOrderStatus::Rejected | ExchangeOrderStatus::Expired
        )
    }
}

impl fmt::Display for ExchangeOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    GoodTilCanceled,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::GoodTilCanceled => "GTC",
        }
    }
}

/// Order as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub order_id: i64,
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub status: ExchangeOrderStatus,
    pub price: f64,
    pub orig_qty: f64,
    pub executed_qty: f64,
}

/// Swap action lifecycle: `Pending -> InProgress -> {Success, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapActionStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl SwapActionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SwapActionStatus::Pending | SwapActionStatus::InProgress)
    }
}

/// Execution record of one leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapActionLeg {
    pub symbol: String,
    pub price: f64,
    pub side: OrderSide,
    pub quantity: Option<f64>,
    /// Base quantity the exchange reported as executed, partial fills included
    #[serde(default)]
    pub executed_quantity: Option<f64>,
    pub external_id: Option<i64>,
    pub external_status: Option<ExchangeOrderStatus>,
    pub external_timestamp: Option<i64>,
}

impl SwapActionLeg {
    pub fn is_filled(&self) -> bool {
        self.external_status == Some(ExchangeOrderStatus::Filled)
    }

    /// Output asset amount of this leg once `quantity` is filled
    pub fn filled_output(&self, quantity: f64) -> f64 {
        match self.side {
            OrderSide::Sell => quantity * self.price,
            OrderSide::Buy => quantity,
        }
    }

    /// True when some of the order executed, filled or not
    pub fn has_executed(&self) -> bool {
        self.executed_quantity.is_some_and(|quantity| quantity > 0.0)
    }
}

impl From<&SwapLeg> for SwapActionLeg {
    fn from(leg: &SwapLeg) -> Self {
        Self {
            symbol: leg.symbol.clone(),
            price: leg.price,
            side: leg.side,
            quantity: None,
            executed_quantity: None,
            external_id: None,
            external_status: None,
            external_timestamp: None,
        }
    }
}

/// One attempt to run a chain for an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapAction {
    pub id: Option<i64>,
    pub order_id: i64,
    pub bot_id: i64,
    pub swap_chain_id: i64,
    pub asset: String,
    pub status: SwapActionStatus,
    pub start_timestamp: i64,
    pub start_quantity: f64,
    pub end_timestamp: Option<i64>,
    pub end_quantity: Option<f64>,
    pub swap_one: SwapActionLeg,
    pub swap_two: SwapActionLeg,
    pub swap_three: SwapActionLeg,
    /// Asset holding the funds after a failed leg; needs manual review
    pub stranded_asset: Option<String>,
}

impl SwapAction {
    pub fn pending(order: &Order, chain_id: i64, chain: &SwapChainEntity, start_quantity: f64, now: i64) -> Self {
        Self {
            id: None,
            order_id: order.id,
            bot_id: order.bot_id,
            swap_chain_id: chain_id,
            asset: chain.asset().to_string(),
            status: SwapActionStatus::Pending,
            start_timestamp: now,
            start_quantity,
            end_timestamp: None,
            end_quantity: None,
            swap_one: SwapActionLeg::from(&chain.swap_one),
            swap_two: SwapActionLeg::from(&chain.swap_two),
            swap_three: SwapActionLeg::from(&chain.swap_three),
            stranded_asset: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn legs(&self) -> [&SwapActionLeg; 3] {
        [&self.swap_one, &self.swap_two, &self.swap_three]
    }

    pub fn leg(&self, index: usize) -> &SwapActionLeg {
        match index {
            0 => &self.swap_one,
            1 => &self.swap_two,
            _ => &self.swap_three,
        }
    }

    pub fn leg_mut(&mut self, index: usize) -> &mut SwapActionLeg {
        match index {
            0 => &mut self.swap_one,
            1 => &mut self.swap_two,
            _ => &mut self.swap_three,
        }
    }
}
