//! Backtest engine replaying daily bars through the breakout rule

use super::metrics::{AggregateMetrics, TradeSummary};
use super::validate::{validate_bars, ValidationError};
use crate::data::PriceBar;
use crate::strategy::{self, StrategyParameters};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use tracing::debug;

/// One evaluated session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyResult {
    pub date: String,
    pub close_price: f64,
    pub target_price: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ma5: Option<f64>,
    pub is_bought: bool,
    pub return_pct: f64,
    pub cumulative_multiplier: f64,
}

/// Result rows plus the statistics derived from them
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub params: StrategyParameters,
    pub results: Vec<DailyResult>,
    pub metrics: AggregateMetrics,
    pub trade_summary: TradeSummary,
}

impl BacktestResult {
    pub fn from_results(params: StrategyParameters, results: Vec<DailyResult>) -> Self {
        let metrics = AggregateMetrics::from_results(&results);
        let trade_summary = TradeSummary::from_results(&results);
        Self {
            params,
            results,
            metrics,
            trade_summary,
        }
    }

    /// `(date, cumulative multiplier)` pairs for charting
    pub fn equity_curve(&self) -> Vec<(&str, f64)> {
        self.results
            .iter()
            .map(|r| (r.date.as_str(), r.cumulative_multiplier))
            .collect()
    }

    /// Export the daily rows to CSV
    pub fn export_csv(&self, path: &str) -> Result<()> {
        let mut file = File::create(path).context("Failed to create CSV file")?;

        writeln!(
            file,
            "date,close_price,target_price,ma5,is_bought,return_pct,cumulative_multiplier"
        )?;

        for r in &self.results {
            writeln!(
                file,
                "{},{},{},{},{},{:.6},{:.8}",
                r.date,
                r.close_price,
                r.target_price,
                r.ma5.map(|v| v.to_string()).unwrap_or_default(),
                r.is_bought,
                r.return_pct,
                r.cumulative_multiplier,
            )?;
        }

        Ok(())
    }
}

/// Stateless breakout backtester
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktestEngine {
    params: StrategyParameters,
}

impl BacktestEngine {
    pub fn new(params: StrategyParameters) -> Self {
        Self { params }
    }

    /// Run the fold. Returns no rows when there are fewer bars than the
    /// strategy's minimum window.
    pub fn run(&self, bars: &[PriceBar]) -> Vec<DailyResult> {
        run(bars, &self.params)
    }

    /// Validate the bars and parameters, then run.
    pub fn run_checked(&self, bars: &[PriceBar]) -> Result<Vec<DailyResult>, ValidationError> {
        self.params.validate()?;
        validate_bars(bars)?;
        Ok(self.run(bars))
    }

    /// Run and derive metrics in one go
    pub fn evaluate(&self, bars: &[PriceBar]) -> BacktestResult {
        BacktestResult::from_results(self.params, self.run(bars))
    }
}

/// Single-pass breakout backtest over `bars` (oldest first).
pub fn run(bars: &[PriceBar], params: &StrategyParameters) -> Vec<DailyResult> {
    let start = params.min_window();
    if bars.len() < start {
        debug!(
            "Insufficient bars: {} supplied, {} required",
            bars.len(),
            start
        );
        return Vec::new();
    }

    let mut cumulative = 1.0_f64;
    let mut results = Vec::with_capacity(bars.len() - start);

    for i in start..bars.len() {
        let decision = strategy::evaluate(bars, i, params);
        cumulative *= decision.multiplier;

        let curr = &bars[i];
        results.push(DailyResult {
            date: curr.date_label(),
            close_price: curr.close,
            target_price: decision.target_price,
            ma5: decision.ma5,
            is_bought: decision.is_bought,
            return_pct: decision.return_pct(),
            cumulative_multiplier: cumulative,
        });
    }

    debug!(
        "Backtest evaluated {} sessions (k={}, fee={}, ma_filter={})",
        results.len(),
        params.k,
        params.fee_rate,
        params.use_ma_filter
    );

    results
}
