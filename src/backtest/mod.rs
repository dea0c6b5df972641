//! Backtesting module for replaying daily bars through the breakout rule

mod comparator;
mod engine;
mod metrics;
mod validate;

pub use comparator::{compare_k_values, k_grid, KSweepResult};
pub use engine::{run, BacktestEngine, BacktestResult, DailyResult};
pub use metrics::{AggregateMetrics, TradeSummary};
pub use validate::{validate_bars, ValidationError};
