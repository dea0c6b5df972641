//! HTTP backend for the dashboard

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{BacktestRequest, BacktestResponse};

use crate::api::UpbitClient;
use crate::config::Config;
use crate::report::{GeminiClient, ReportService};
use anyhow::{Context, Result};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub struct AppState {
    pub config: Config,
    pub upbit: UpbitClient,
    /// `None` when AI reports are disabled or no key is configured
    pub reports: Option<ReportService>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let upbit = UpbitClient::new(&config.upbit)?;

        let reports = if !config.ai.enabled {
            info!("AI reports disabled");
            None
        } else {
            match GeminiClient::new(&config.ai) {
                Ok(client) => Some(ReportService::new(
                    Arc::new(client),
                    Duration::from_secs(config.ai.cache_ttl_secs),
                )),
                Err(e) => {
                    warn!("AI reports unavailable: {}", e);
                    None
                }
            }
        };

        Ok(Self {
            config,
            upbit,
            reports,
        })
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    match config.server.allowed_origins() {
        None => cors.allow_origin(Any).allow_headers(Any),
        Some(origins) => {
            let values: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            // Credentials cannot be combined with wildcard headers
            cors.allow_origin(values)
                .allow_headers([CONTENT_TYPE, ACCEPT, AUTHORIZATION])
                .allow_credentials(true)
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/backtest", post(handlers::run_backtest))
        .route("/api/ai/report", post(handlers::ai_report))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Backtest server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::TextGenerator;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixed;

    #[async_trait]
    impl TextGenerator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(r#"{"summary":"Trend days carry the equity curve","risks":["chop"]}"#.into())
        }
    }

    fn test_state(upbit_url: &str, reports: Option<ReportService>) -> Arc<AppState> {
        let mut config = Config::default();
        config.upbit.rest_url = upbit_url.to_string();
        config.upbit.request_delay_ms = 0;
        Arc::new(AppState {
            upbit: UpbitClient::new(&config.upbit).unwrap(),
            config,
            reports,
        })
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn candle_json(day: u32, open: f64, high: f64, low: f64, close: f64) -> Value {
        json!({
            "market": "KRW-BTC",
            "candle_date_time_utc": format!("2024-03-{:02}T00:00:00", day),
            "candle_date_time_kst": format!("2024-03-{:02}T09:00:00", day),
            "opening_price": open,
            "high_price": high,
            "low_price": low,
            "trade_price": close,
            "candle_acc_trade_volume": 10.0,
            "timestamp": 1709942399999i64
        })
    }

    fn backtest_body() -> Value {
        json!({"symbol": "KRW-BTC", "k": 0.5, "fee": 0.0005, "days": 10, "useMaFilter": false})
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(test_state("http://127.0.0.1:9", None));
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_backtest_rejects_bad_parameters() {
        let state = test_state("http://127.0.0.1:9", None);

        for patch in [
            json!({"days": 9}),
            json!({"days": 2001}),
            json!({"k": -0.1}),
            json!({"fee": -0.001}),
        ] {
            let mut body = backtest_body();
            for (key, value) in patch.as_object().unwrap() {
                body[key] = value.clone();
            }
            let (status, json) = post_json(router(state.clone()), "/api/backtest", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(json["detail"].is_string());
        }
    }

    #[tokio::test]
    async fn test_backtest_not_enough_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/candles/days"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                candle_json(3, 100.0, 105.0, 95.0, 102.0),
                candle_json(2, 98.0, 101.0, 97.0, 100.0),
            ])))
            .mount(&server)
            .await;

        let app = router(test_state(&server.uri(), None));
        let (status, json) = post_json(app, "/api/backtest", backtest_body()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Not enough OHLCV data");
    }

    #[tokio::test]
    async fn test_backtest_runs_and_degrades_missing_ticker() {
        let server = MockServer::start().await;
        // Newest first, as Upbit returns them
        let candles: Vec<Value> = (1..=8)
            .rev()
            .map(|day| {
                let base = 100.0 + day as f64;
                candle_json(day, base, base + 6.0, base - 2.0, base + 4.0)
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/candles/days"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(candles)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ticker"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let app = router(test_state(&server.uri(), None));
        let (status, json) = post_json(app, "/api/backtest", backtest_body()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(json["ticker"].is_null());
        let results = json["results"].as_array().unwrap();
        // Filter off: every bar after the first is evaluated
        assert_eq!(results.len(), 7);
        assert_eq!(results[0]["date"], "2024-03-02");
        assert!(results[0].get("ma5").is_none());
        assert_eq!(json["metrics"]["totalDays"], 7);
        assert!(json["tradeSummary"].is_object());
    }

    #[tokio::test]
    async fn test_backtest_upstream_failure_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let app = router(test_state(&server.uri(), None));
        let (status, _) = post_json(app, "/api/backtest", backtest_body()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    fn report_body(total_days: u32) -> Value {
        json!({
            "symbol": "KRW-BTC",
            "k": 0.5,
            "fee": 0.0005,
            "days": 100,
            "useMaFilter": true,
            "metrics": {
                "totalReturnPct": 4.2,
                "cagrPct": 16.0,
                "finalMultiplier": 1.042,
                "tradeCount": 12,
                "winningTrades": 7,
                "losingTrades": 5,
                "winRate": 0.5833,
                "maxDrawdownPct": 3.1,
                "totalDays": total_days
            },
            "tradeSummary": {
                "avgTradeReturnPct": 0.35,
                "bestTradePct": 4.0,
                "worstTradePct": -2.5,
                "maxConsecutiveWins": 3,
                "maxConsecutiveLosses": 2,
                "exposurePct": 12.0,
                "firstDate": "2024-01-01",
                "lastDate": "2024-04-09"
            }
        })
    }

    #[tokio::test]
    async fn test_ai_report_unavailable_without_generator() {
        let app = router(test_state("http://127.0.0.1:9", None));
        let (status, json) = post_json(app, "/api/ai/report", report_body(100)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn test_ai_report_null_for_empty_backtest() {
        let app = router(test_state("http://127.0.0.1:9", None));
        let (status, json) = post_json(app, "/api/ai/report", report_body(0)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["report"].is_null());
        assert_eq!(json["cached"], false);
    }

    #[tokio::test]
    async fn test_ai_report_cached_on_repeat() {
        let reports = ReportService::new(Arc::new(Fixed), Duration::from_secs(60));
        let state = test_state("http://127.0.0.1:9", Some(reports));

        let (status, first) = post_json(router(state.clone()), "/api/ai/report", report_body(100)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["cached"], false);
        assert_eq!(first["report"]["summary"], "Trend days carry the equity curve");
        assert_eq!(first["report"]["risks"][0], "chop");

        let (_, second) = post_json(router(state), "/api/ai/report", report_body(100)).await;
        assert_eq!(second["cached"], true);
    }

    fn newest_first_candles(n: u32) -> Value {
        let candles: Vec<Value> = (1..=n)
            .rev()
            .map(|day| {
                let base = 100.0 + day as f64;
                candle_json(day, base, base + 6.0, base - 2.0, base + 4.0)
            })
            .collect();
        json!(candles)
    }

    #[tokio::test]
    async fn test_backtest_evaluates_requested_days() {
        let server = MockServer::start().await;
        // Filter on needs five warm-up bars, filter off needs one
        Mock::given(method("GET"))
            .and(path("/candles/days"))
            .and(query_param("count", "15"))
            .respond_with(ResponseTemplate::new(200).set_body_json(newest_first_candles(15)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/candles/days"))
            .and(query_param("count", "11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(newest_first_candles(11)))
            .mount(&server)
            .await;

        let state = test_state(&server.uri(), None);
        for filter in [true, false] {
            let mut body = backtest_body();
            body["useMaFilter"] = json!(filter);
            let (status, json) = post_json(router(state.clone()), "/api/backtest", body).await;

            assert_eq!(status, StatusCode::OK, "filter={}", filter);
            assert_eq!(json["results"].as_array().unwrap().len(), 10, "filter={}", filter);
            assert_eq!(json["metrics"]["totalDays"], 10);
        }
    }

    #[tokio::test]
    async fn test_cors_credentials_only_for_listed_origins() {
        let mut config = Config::default();
        config.server.cors_origins = "https://dash.example".into();
        let state = Arc::new(AppState {
            upbit: UpbitClient::new(&config.upbit).unwrap(),
            config,
            reports: None,
        });

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("origin", "https://dash.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "https://dash.example");
        assert_eq!(headers["access-control-allow-credentials"], "true");

        let response = router(test_state("http://127.0.0.1:9", None))
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("origin", "https://dash.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert!(response.headers().get("access-control-allow-credentials").is_none());
    }
}
