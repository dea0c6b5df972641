use serde::{Deserialize, Serialize};

use crate::strategy::indicators;

/// Live snapshot of a market with today's breakout threshold attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTicker {
    pub symbol: String,
    pub current_price: f64,
    pub opening_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub target_price: f64,
    pub ma5: f64,
    pub change_rate: f64,
}

impl MarketTicker {
    /// Distance from the current price to the target, as a percentage of the target.
    pub fn distance_to_target_pct(&self) -> f64 {
        if self.target_price == 0.0 {
            return 0.0;
        }
        (self.current_price - self.target_price) / self.target_price * 100.0
    }

    /// Whether the breakout has already triggered today.
    pub fn is_breakout(&self) -> bool {
        self.high_price > self.target_price
    }

    /// Whether today's open sits above the trend line.
    pub fn trend_ok(&self) -> bool {
        self.opening_price > self.ma5
    }
}

/// Builds the target price for a live session from yesterday's range.
pub fn live_target(opening_price: f64, prev_high: f64, prev_low: f64, k: f64) -> f64 {
    indicators::target_price(opening_price, prev_high - prev_low, k)
}
