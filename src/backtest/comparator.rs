//! K-value comparator
//!
//! Runs the breakout rule with several K values on the same bars and
//! compares the outcomes.

use super::engine::{BacktestEngine, BacktestResult};
use crate::data::PriceBar;
use crate::strategy::StrategyParameters;
use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::fs::File;
use std::io::Write;
use tracing::info;

/// Result of sweeping K over the same bars
#[derive(Debug)]
pub struct KSweepResult {
    pub base: StrategyParameters,
    /// One entry per K, sorted by total return descending
    pub results: Vec<(f64, BacktestResult)>,
    pub bars_count: usize,
}

impl KSweepResult {
    /// Get the best K by total return
    pub fn best_by_return(&self) -> Option<&(f64, BacktestResult)> {
        self.results.iter().max_by(|a, b| {
            a.1.metrics
                .total_return_pct
                .partial_cmp(&b.1.metrics.total_return_pct)
                .unwrap_or(Ordering::Equal)
        })
    }

    /// Get the K with the shallowest drawdown among runs that traded
    pub fn best_by_drawdown(&self) -> Option<&(f64, BacktestResult)> {
        self.results
            .iter()
            .filter(|(_, r)| r.metrics.trade_count > 0)
            .min_by(|a, b| {
                a.1.metrics
                    .max_drawdown_pct
                    .partial_cmp(&b.1.metrics.max_drawdown_pct)
                    .unwrap_or(Ordering::Equal)
            })
    }

    /// Export results to CSV
    pub fn export_csv(&self, path: &str) -> Result<()> {
        let mut file = File::create(path).context("Failed to create CSV file")?;

        writeln!(
            file,
            "k,trades,win_rate,total_return_pct,cagr_pct,max_drawdown_pct,days"
        )?;

        for (k, result) in &self.results {
            let m = &result.metrics;
            writeln!(
                file,
                "{:.2},{},{:.4},{:.4},{:.4},{:.4},{}",
                k,
                m.trade_count,
                m.win_rate,
                m.total_return_pct,
                if m.cagr_pct.is_finite() { m.cagr_pct } else { 0.0 },
                m.max_drawdown_pct,
                m.total_days,
            )?;
        }

        Ok(())
    }
}

/// Inclusive grid of K values from `start` to `end`.
///
/// Steps are computed by index so the grid does not drift; values are rounded
/// to four decimals.
pub fn k_grid(start: f64, end: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || !step.is_finite() || end < start {
        return vec![start];
    }

    let steps = ((end - start) / step + 1e-9).floor() as usize;
    (0..=steps)
        .map(|i| ((start + step * i as f64) * 10_000.0).round() / 10_000.0)
        .collect()
}

/// Run one backtest per K value
pub fn compare_k_values(bars: &[PriceBar], base: StrategyParameters, ks: &[f64]) -> KSweepResult {
    info!(
        "Sweeping {} K values over {} bars (ma_filter={})",
        ks.len(),
        bars.len(),
        base.use_ma_filter
    );

    let mut results: Vec<(f64, BacktestResult)> = ks
        .iter()
        .map(|&k| {
            let result = BacktestEngine::new(base.with_k(k)).evaluate(bars);
            info!(
                "  k={:.2}: {} trades, {:.2}% return",
                k, result.metrics.trade_count, result.metrics.total_return_pct
            );
            (k, result)
        })
        .collect();

    // Sort by return descending
    results.sort_by(|a, b| {
        b.1.metrics
            .total_return_pct
            .partial_cmp(&a.1.metrics.total_return_pct)
            .unwrap_or(Ordering::Equal)
    });

    KSweepResult {
        base,
        results,
        bars_count: bars.len(),
    }
}
