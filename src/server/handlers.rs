use super::error::ApiError;
use super::AppState;
use crate::backtest::{AggregateMetrics, BacktestEngine, DailyResult, TradeSummary};
use crate::data::MarketTicker;
use crate::report::{AiReportRequest, AiReportResponse};
use crate::strategy::StrategyParameters;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const MIN_DAYS: u32 = 10;
const MAX_DAYS: u32 = 2000;
const MIN_BARS: usize = 6;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRequest {
    pub symbol: String,
    pub k: f64,
    pub fee: f64,
    pub days: u32,
    pub use_ma_filter: bool,
}

impl BacktestRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.symbol.trim().is_empty() {
            return Err(ApiError::BadRequest("symbol must not be empty".into()));
        }
        if !self.k.is_finite() || self.k < 0.0 {
            return Err(ApiError::BadRequest("k must be >= 0".into()));
        }
        if !self.fee.is_finite() || self.fee < 0.0 {
            return Err(ApiError::BadRequest("fee must be >= 0".into()));
        }
        if !(MIN_DAYS..=MAX_DAYS).contains(&self.days) {
            return Err(ApiError::BadRequest(format!(
                "days must be between {} and {}",
                MIN_DAYS, MAX_DAYS
            )));
        }
        Ok(())
    }

    fn params(&self) -> StrategyParameters {
        StrategyParameters::new(self.k, self.fee, self.use_ma_filter).with_lookback(self.days as usize)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResponse {
    pub results: Vec<DailyResult>,
    pub ticker: Option<MarketTicker>,
    pub metrics: AggregateMetrics,
    pub trade_summary: TradeSummary,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn run_backtest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BacktestRequest>,
) -> Result<Json<BacktestResponse>, ApiError> {
    request.validate()?;
    let params = request.params();

    let bars = state
        .upbit
        .fetch_daily_candles(&request.symbol, params.bars_needed())
        .await
        .map_err(|e| ApiError::upstream("Upbit API error", e))?;

    if bars.len() < MIN_BARS {
        return Err(ApiError::BadRequest("Not enough OHLCV data".into()));
    }

    let result = BacktestEngine::new(params).evaluate(&bars);
    info!(
        "Backtest {} k={:.2} fee={} filter={}: {} rows, {:.2}% return",
        request.symbol,
        request.k,
        request.fee,
        request.use_ma_filter,
        result.results.len(),
        result.metrics.total_return_pct
    );

    let ticker = match state.upbit.fetch_ticker(&request.symbol, request.k).await {
        Ok(ticker) => Some(ticker),
        Err(e) => {
            warn!("Ticker unavailable for {}: {:#}", request.symbol, e);
            None
        }
    };

    Ok(Json(BacktestResponse {
        results: result.results,
        ticker,
        metrics: result.metrics,
        trade_summary: result.trade_summary,
    }))
}

pub async fn ai_report(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AiReportRequest>,
) -> Result<Json<AiReportResponse>, ApiError> {
    if request.metrics.total_days == 0 {
        return Ok(Json(AiReportResponse {
            report: None,
            cached: false,
        }));
    }

    let reports = state
        .reports
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("AI report is not configured".into()))?;

    let response = reports
        .report(&request)
        .await
        .map_err(|e| ApiError::upstream("AI report failed", e))?;

    Ok(Json(response))
}
