//! Upbit public REST API client
//!
//! Fetches daily candles and tickers for KRW markets. No authentication is
//! needed for these endpoints.

use crate::api::models::{UpbitCandle, UpbitErrorResponse, UpbitTicker};
use crate::config::UpbitConfig;
use crate::data::{MarketTicker, PriceBar};
use crate::data::ticker::live_target;
use crate::strategy::MA_WINDOW;
use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Upbit caps `count` at 200 per candle request
const MAX_BATCH: usize = 200;

/// Upbit REST API client
pub struct UpbitClient {
    client: Client,
    base_url: String,
    batch_size: usize,
    min_interval: Duration,
    last_request: Mutex<Instant>,
}

impl UpbitClient {
    pub fn new(config: &UpbitConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let min_interval = Duration::from_millis(config.request_delay_ms);

        Ok(Self {
            client,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            batch_size: config.batch_size.clamp(1, MAX_BATCH),
            min_interval,
            last_request: Mutex::new(Instant::now() - min_interval),
        })
    }

    /// Wait for rate limiting if necessary
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < self.min_interval {
            tokio::time::sleep(self.min_interval - elapsed).await;
        }
        *last = Instant::now();
    }

    /// GET a JSON array endpoint
    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        self.rate_limit().await;

        let url = format!("{}{}", self.base_url, path);
        debug!("Upbit request: {} with params: {:?}", path, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("Upbit request to {} failed", path))?;

        let status = response.status();
        let body = response.text().await?;

        debug!(
            "Upbit response: {} - {}",
            status,
            body.chars().take(200).collect::<String>()
        );

        if !status.is_success() {
            let detail = serde_json::from_str::<UpbitErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(anyhow!("Upbit API error: {} ({})", status.as_u16(), detail));
        }

        let value: serde_json::Value =
            serde_json::from_str(&body).context("Failed to parse Upbit response")?;
        if !value.is_array() {
            bail!("Unexpected Upbit response: expected a JSON array");
        }

        serde_json::from_value(value).context("Failed to decode Upbit response")
    }

    /// Fetch up to `count` daily bars, oldest first.
    ///
    /// Pages backwards in batches using the `to` cursor and stops early when
    /// the exchange runs out of history.
    pub async fn fetch_daily_candles(&self, symbol: &str, count: usize) -> Result<Vec<PriceBar>> {
        let mut raw: Vec<UpbitCandle> = Vec::with_capacity(count);
        let mut remaining = count;
        let mut cursor: Option<String> = None;

        while remaining > 0 {
            let batch_count = remaining.min(self.batch_size);
            let mut params = vec![
                ("market", symbol.to_string()),
                ("count", batch_count.to_string()),
            ];
            if let Some(to) = &cursor {
                params.push(("to", to.clone()));
            }

            let batch: Vec<UpbitCandle> = self.get_list("/candles/days", &params).await?;
            if batch.is_empty() {
                break;
            }

            let received = batch.len();
            remaining = remaining.saturating_sub(received);
            cursor = batch.last().map(|c| c.candle_date_time_utc.clone());
            raw.extend(batch);

            if received < batch_count {
                break;
            }
        }

        raw.truncate(count);
        raw.reverse();

        let bars: Vec<PriceBar> = raw
            .iter()
            .filter_map(|candle| {
                let bar = candle.to_price_bar();
                if bar.is_none() {
                    warn!(
                        "Skipping candle with unparseable time: {}",
                        candle.candle_date_time_utc
                    );
                }
                bar
            })
            .collect();

        info!("Fetched {} daily candles for {}", bars.len(), symbol);
        Ok(bars)
    }

    /// Fetch the live ticker with today's breakout target and MA5
    pub async fn fetch_ticker(&self, symbol: &str, k: f64) -> Result<MarketTicker> {
        let tickers: Vec<UpbitTicker> = self
            .get_list("/ticker", &[("markets", symbol.to_string())])
            .await?;
        let ticker = tickers
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No ticker returned for {}", symbol))?;

        let candles: Vec<UpbitCandle> = self
            .get_list(
                "/candles/days",
                &[
                    ("market", symbol.to_string()),
                    ("count", (MA_WINDOW + 1).to_string()),
                ],
            )
            .await?;

        assemble_ticker(&ticker, &candles, k)
    }
}

/// Combine a ticker with recent daily candles (newest first).
///
/// Today's candle is `candles[0]`; MA5 averages the completed days after it,
/// falling back to whatever history is available.
pub fn assemble_ticker(ticker: &UpbitTicker, candles: &[UpbitCandle], k: f64) -> Result<MarketTicker> {
    if candles.is_empty() {
        bail!("No daily candles returned for {}", ticker.market);
    }

    let ma_source = if candles.len() > MA_WINDOW {
        &candles[1..=MA_WINDOW]
    } else if candles.len() > 1 {
        &candles[1..]
    } else {
        candles
    };
    let ma5 = ma_source.iter().map(|c| c.trade_price).sum::<f64>() / ma_source.len() as f64;

    let prev_day = candles.get(1).unwrap_or(&candles[0]);
    let target_price = live_target(ticker.opening_price, prev_day.high_price, prev_day.low_price, k);

    Ok(MarketTicker {
        symbol: ticker.market.clone(),
        current_price: ticker.trade_price,
        opening_price: ticker.opening_price,
        high_price: ticker.high_price,
        low_price: ticker.low_price,
        target_price,
        ma5,
        change_rate: ticker.signed_change_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn candle(day: u32, high: f64, low: f64, close: f64) -> UpbitCandle {
        UpbitCandle {
            market: "KRW-BTC".into(),
            candle_date_time_utc: format!("2024-03-{:02}T00:00:00", day),
            candle_date_time_kst: format!("2024-03-{:02}T09:00:00", day),
            opening_price: close,
            high_price: high,
            low_price: low,
            trade_price: close,
            candle_acc_trade_volume: 1.0,
            timestamp: None,
        }
    }

    fn ticker() -> UpbitTicker {
        UpbitTicker {
            market: "KRW-BTC".into(),
            trade_price: 110.0,
            opening_price: 103.0,
            high_price: 112.0,
            low_price: 101.0,
            prev_closing_price: 102.0,
            signed_change_rate: 0.0784,
            acc_trade_volume_24h: 0.0,
            timestamp: None,
        }
    }

    #[test]
    fn test_assemble_ticker_full_history() {
        // newest first: today, then five completed days
        let candles = vec![
            candle(10, 112.0, 101.0, 110.0),
            candle(9, 105.0, 95.0, 102.0),
            candle(8, 104.0, 96.0, 100.0),
            candle(7, 103.0, 97.0, 98.0),
            candle(6, 102.0, 98.0, 100.0),
            candle(5, 101.0, 99.0, 100.0),
        ];
        let t = assemble_ticker(&ticker(), &candles, 0.5).unwrap();

        assert_eq!(t.target_price, 108.0);
        assert_eq!(t.ma5, 100.0);
        assert_eq!(t.current_price, 110.0);
        assert_eq!(t.change_rate, 0.0784);
    }

    #[test]
    fn test_assemble_ticker_short_history() {
        let candles = vec![candle(10, 112.0, 101.0, 110.0), candle(9, 105.0, 95.0, 102.0)];
        let t = assemble_ticker(&ticker(), &candles, 0.5).unwrap();
        assert_eq!(t.ma5, 102.0);
        assert_eq!(t.target_price, 108.0);

        let only_today = vec![candle(10, 112.0, 101.0, 110.0)];
        let t = assemble_ticker(&ticker(), &only_today, 0.5).unwrap();
        assert_eq!(t.ma5, 110.0);
        assert_eq!(t.target_price, 103.0 + 11.0 * 0.5);
    }

    #[test]
    fn test_assemble_ticker_requires_candles() {
        assert!(assemble_ticker(&ticker(), &[], 0.5).is_err());
    }

    fn candle_json(day: u32, close: f64) -> serde_json::Value {
        serde_json::json!({
            "market": "KRW-BTC",
            "candle_date_time_utc": format!("2024-03-{:02}T00:00:00", day),
            "candle_date_time_kst": format!("2024-03-{:02}T09:00:00", day),
            "opening_price": close,
            "high_price": close + 1.0,
            "low_price": close - 1.0,
            "trade_price": close,
            "candle_acc_trade_volume": 10.0
        })
    }

    fn client_for(server: &MockServer) -> UpbitClient {
        let config = UpbitConfig {
            rest_url: server.uri(),
            request_delay_ms: 0,
            batch_size: 2,
            ..Default::default()
        };
        UpbitClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_daily_candles_pages_backwards() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/candles/days"))
            .and(query_param("to", "2024-03-09T00:00:00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([candle_json(8, 98.0)])))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/candles/days"))
            .and(query_param("market", "KRW-BTC"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([candle_json(10, 110.0), candle_json(9, 109.0)])),
            )
            .mount(&server)
            .await;

        let bars = client_for(&server).fetch_daily_candles("KRW-BTC", 5).await.unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date_label(), "2024-03-08");
        assert_eq!(bars[2].date_label(), "2024-03-10");
        assert_eq!(bars[2].close, 110.0);
    }

    #[tokio::test]
    async fn test_fetch_daily_candles_truncates_to_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/candles/days"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([candle_json(10, 110.0), candle_json(9, 109.0)])),
            )
            .mount(&server)
            .await;

        let bars = client_for(&server).fetch_daily_candles("KRW-BTC", 1).await.unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 110.0);
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ticker"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string(r#"{"error":{"name":"404","message":"Code not found"}}"#),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_ticker("KRW-NOPE", 0.5).await.unwrap_err();
        assert!(err.to_string().contains("Code not found"));
    }

    #[tokio::test]
    async fn test_non_array_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/candles/days"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_daily_candles("KRW-BTC", 3).await.unwrap_err();
        assert!(err.to_string().contains("Unexpected Upbit response"));
    }

    #[test]
    fn test_client_clamps_batch_size() {
        let config = UpbitConfig {
            batch_size: 1000,
            ..Default::default()
        };
        let client = UpbitClient::new(&config).unwrap();
        assert_eq!(client.batch_size, MAX_BATCH);
        assert_eq!(client.base_url, "https://api.upbit.com/v1");
    }
}
