//! Performance metrics calculation for backtesting

use super::engine::DailyResult;
use serde::{Deserialize, Serialize};

/// Sessions per year; crypto markets trade every calendar day
const DAYS_PER_YEAR: f64 = 365.0;

/// Headline statistics of a backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
    // Returns
    pub total_return_pct: f64,
    pub cagr_pct: f64,
    pub final_multiplier: f64,

    // Trades
    pub trade_count: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// Share of trades with a positive return, in [0, 1]
    pub win_rate: f64,

    // Risk
    pub max_drawdown_pct: f64,

    pub total_days: u32,
}

impl Default for AggregateMetrics {
    fn default() -> Self {
        Self {
            total_return_pct: 0.0,
            cagr_pct: 0.0,
            final_multiplier: 1.0,
            trade_count: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            max_drawdown_pct: 0.0,
            total_days: 0,
        }
    }
}

impl AggregateMetrics {
    /// Fold the full result sequence into metrics
    pub fn from_results(results: &[DailyResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }

        let trade_count = results.iter().filter(|r| r.is_bought).count() as u32;
        let winning_trades = results
            .iter()
            .filter(|r| r.is_bought && r.return_pct > 0.0)
            .count() as u32;
        let losing_trades = results
            .iter()
            .filter(|r| r.is_bought && r.return_pct < 0.0)
            .count() as u32;

        let total_days = results.len() as u32;
        let final_multiplier = results
            .last()
            .map(|r| r.cumulative_multiplier)
            .unwrap_or(1.0);

        Self {
            total_return_pct: total_return_pct(results),
            cagr_pct: cagr_pct(final_multiplier, total_days),
            final_multiplier,
            trade_count,
            winning_trades,
            losing_trades,
            win_rate: win_rate(results),
            max_drawdown_pct: max_drawdown_pct(results),
            total_days,
        }
    }

    pub fn win_rate_pct(&self) -> f64 {
        self.win_rate * 100.0
    }
}

/// Winning trades over all trades; 0 when nothing was bought
pub fn win_rate(results: &[DailyResult]) -> f64 {
    let trades = results.iter().filter(|r| r.is_bought).count();
    if trades == 0 {
        return 0.0;
    }
    let wins = results
        .iter()
        .filter(|r| r.is_bought && r.return_pct > 0.0)
        .count();
    wins as f64 / trades as f64
}

/// Largest peak-to-trough drop of the cumulative multiplier, in percent
pub fn max_drawdown_pct(results: &[DailyResult]) -> f64 {
    let Some(first) = results.first() else {
        return 0.0;
    };

    let mut peak = first.cumulative_multiplier;
    let mut max_dd = 0.0_f64;

    for row in results {
        let value = row.cumulative_multiplier;
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let dd = (peak - value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd * 100.0
}

pub fn total_return_pct(results: &[DailyResult]) -> f64 {
    results
        .last()
        .map(|r| (r.cumulative_multiplier - 1.0) * 100.0)
        .unwrap_or(0.0)
}

/// Compound annual growth rate over `days` sessions
pub fn cagr_pct(final_multiplier: f64, days: u32) -> f64 {
    if days == 0 || !final_multiplier.is_finite() || final_multiplier <= 0.0 {
        return 0.0;
    }
    (final_multiplier.powf(DAYS_PER_YEAR / days as f64) - 1.0) * 100.0
}

/// Per-trade breakdown used by the summary cards and the AI report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSummary {
    pub avg_trade_return_pct: f64,
    pub best_trade_pct: f64,
    pub worst_trade_pct: f64,
    pub max_consecutive_wins: u32,
    pub max_consecutive_losses: u32,
    /// Bought days as a share of all days, in percent
    pub exposure_pct: f64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

impl TradeSummary {
    pub fn from_results(results: &[DailyResult]) -> Self {
        let trades: Vec<f64> = results
            .iter()
            .filter(|r| r.is_bought)
            .map(|r| r.return_pct)
            .collect();

        let mut summary = Self {
            first_date: results.first().map(|r| r.date.clone()),
            last_date: results.last().map(|r| r.date.clone()),
            ..Default::default()
        };

        if trades.is_empty() {
            return summary;
        }

        summary.avg_trade_return_pct = trades.iter().sum::<f64>() / trades.len() as f64;
        summary.best_trade_pct = trades.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        summary.worst_trade_pct = trades.iter().copied().fold(f64::INFINITY, f64::min);
        summary.exposure_pct = trades.len() as f64 / results.len() as f64 * 100.0;

        // Streaks count consecutive trades, skipping flat days in between.
        // A breakeven trade is neither a win nor a loss and ends both streaks.
        let (mut wins, mut losses) = (0u32, 0u32);
        for ret in &trades {
            if *ret > 0.0 {
                wins += 1;
                losses = 0;
            } else if *ret < 0.0 {
                losses += 1;
                wins = 0;
            } else {
                wins = 0;
                losses = 0;
            }
            summary.max_consecutive_wins = summary.max_consecutive_wins.max(wins);
            summary.max_consecutive_losses = summary.max_consecutive_losses.max(losses);
        }

        summary
    }
}
