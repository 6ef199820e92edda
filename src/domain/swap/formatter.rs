//! Price/quantity normalization and percent arithmetic

use std::fmt;

use serde::{Deserialize, Serialize};
use crate::domain::pair::TradingPair;

const MAX_DECIMALS: i32 = 12;

/// Profit expressed as a percentage of the starting amount
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(f64);

impl Percent {
    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn gte(&self, other: f64) -> bool {
        self.0 >= other
    }
}

impl From<f64> for Percent {
    fn from(value: f64) -> Self {
        Percent(value)
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

/// Stateless rounding rules shared by finder, validator and executor
#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter;

impl Formatter {
    pub fn new() -> Self {
        Self
    }

    /// Round half away from zero to `decimals` places
    pub fn to_fixed(&self, value: f64, decimals: i32) -> f64 {
        let factor = 10_f64.powi(decimals);
        (value * factor).round() / factor
    }

    /// Number of decimal places a step/tick size carries (0.0001 -> 4)
    pub fn decimals_of(&self, step: f64) -> i32 {
        (0..MAX_DECIMALS)
            .find(|&d| {
                let scaled = step * 10_f64.powi(d);
                (scaled - scaled.round()).abs() < 1e-9
            })
            .unwrap_or(MAX_DECIMALS)
    }

    /// Floor `quantity` to the pair's lot step
    pub fn round_quantity(&self, pair: &TradingPair, quantity: f64) -> f64 {
        self.floor_to_step(quantity, pair.quantity_step)
    }

    /// Round `price` to the nearest tick of the pair
    pub fn round_price(&self, pair: &TradingPair, price: f64) -> f64 {
        let tick = pair.price_tick;
        if tick <= 0.0 {
            return price;
        }
        let ticks = self.to_fixed(price / tick, 6).round();
        self.to_fixed(ticks * tick, self.decimals_of(tick))
    }

    /// `(to - from) / from * 100`, sign preserved
    pub fn percent(&self, from: f64, to: f64) -> f64 {
        if from == 0.0 {
            return 0.0;
        }
        (to - from) / from * 100.0
    }

    fn floor_to_step(&self, value: f64, step: f64) -> f64 {
        if step <= 0.0 {
            return value;
        }
        // ratio is pre-rounded so 99.99999999 steps floors to 100
        let steps = self.to_fixed(value / step, 6).floor();
        self.to_fixed(steps * step, self.decimals_of(step))
    }
}
