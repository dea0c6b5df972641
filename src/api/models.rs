use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::data::PriceBar;

/// Daily candle from `GET /candles/days`
#[derive(Debug, Clone, Deserialize)]
pub struct UpbitCandle {
    pub market: String,
    pub candle_date_time_utc: String,
    pub candle_date_time_kst: String,
    pub opening_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub trade_price: f64,
    pub candle_acc_trade_volume: f64,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl UpbitCandle {
    /// Session start in UTC (`candle_date_time_utc` carries no offset)
    pub fn utc_time(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.candle_date_time_utc, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn to_price_bar(&self) -> Option<PriceBar> {
        Some(
            PriceBar::new(
                self.utc_time()?,
                self.opening_price,
                self.high_price,
                self.low_price,
                self.trade_price,
            )
            .with_volume(self.candle_acc_trade_volume),
        )
    }
}

/// Snapshot from `GET /ticker`
#[derive(Debug, Clone, Deserialize)]
pub struct UpbitTicker {
    pub market: String,
    pub trade_price: f64,
    pub opening_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub prev_closing_price: f64,
    pub signed_change_rate: f64,
    #[serde(default)]
    pub acc_trade_volume_24h: f64,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Error body returned on non-200 responses
#[derive(Debug, Clone, Deserialize)]
pub struct UpbitErrorResponse {
    pub error: UpbitErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpbitErrorBody {
    pub name: String,
    pub message: String,
}
