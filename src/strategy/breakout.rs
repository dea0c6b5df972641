//! Volatility Breakout Strategy
//!
//! Buys at today's breakout threshold (open + K x yesterday's range) when the
//! day's high crosses it, and sells at the close. An optional trend filter
//! only allows entries when today's open is above the 5-day average close.

use crate::data::candles::closes;
use crate::data::PriceBar;
use crate::strategy::indicators::{self, MA_WINDOW};
use serde::{Deserialize, Serialize};

pub const DEFAULT_K: f64 = 0.5;
/// Upbit KRW market fee per side (0.05%)
pub const DEFAULT_FEE_RATE: f64 = 0.0005;
pub const DEFAULT_LOOKBACK_DAYS: usize = 100;

/// Parameters for a breakout run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyParameters {
    pub k: f64,
    pub fee_rate: f64,
    pub use_ma_filter: bool,
    pub lookback_days: usize,
}

impl Default for StrategyParameters {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            fee_rate: DEFAULT_FEE_RATE,
            use_ma_filter: true,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl StrategyParameters {
    pub fn new(k: f64, fee_rate: f64, use_ma_filter: bool) -> Self {
        Self {
            k,
            fee_rate,
            use_ma_filter,
            ..Default::default()
        }
    }

    pub fn with_k(mut self, k: f64) -> Self {
        self.k = k;
        self
    }

    pub fn with_lookback(mut self, days: usize) -> Self {
        self.lookback_days = days;
        self
    }

    /// Index of the first bar that can be evaluated.
    pub fn min_window(&self) -> usize {
        if self.use_ma_filter {
            MA_WINDOW
        } else {
            1
        }
    }

    /// Bars to request so that exactly `lookback_days` sessions are evaluated
    pub fn bars_needed(&self) -> usize {
        self.lookback_days + self.min_window()
    }
}

/// Decision for a single session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakoutDecision {
    pub target_price: f64,
    pub ma5: Option<f64>,
    pub is_bought: bool,
    /// Growth factor of the day: 1.0 when flat
    pub multiplier: f64,
}

impl BreakoutDecision {
    pub fn return_pct(&self) -> f64 {
        (self.multiplier - 1.0) * 100.0
    }
}

/// Evaluates bar `i` using only `bars[..i]` for the range and the trend.
///
/// Callers guarantee `i >= params.min_window()` and `i < bars.len()`.
pub fn evaluate(bars: &[PriceBar], i: usize, params: &StrategyParameters) -> BreakoutDecision {
    let prev = &bars[i - 1];
    let curr = &bars[i];

    let target = indicators::target_price(curr.open, prev.range(), params.k);

    let ma5 = if params.use_ma_filter {
        indicators::sma(&closes(&bars[i - MA_WINDOW..i]), MA_WINDOW)
    } else {
        None
    };

    let breakout = curr.high > target;
    let is_bought = match ma5 {
        Some(ma) => breakout && curr.open > ma,
        None => breakout,
    };

    let multiplier = if is_bought {
        (curr.close / target) - (params.fee_rate * 2.0)
    } else {
        1.0
    };

    BreakoutDecision {
        target_price: target,
        ma5,
        is_bought,
        multiplier,
    }
}
