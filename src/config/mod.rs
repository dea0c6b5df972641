use crate::strategy::{StrategyParameters, DEFAULT_FEE_RATE, DEFAULT_K};
use anyhow::{Context, Result};
use config::{Config as ConfigLoader, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upbit: UpbitConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub backtest: BacktestDefaults,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpbitConfig {
    pub rest_url: String,
    pub request_timeout_secs: u64,
    /// Minimum delay between requests (public API allows ~10 req/s)
    pub request_delay_ms: u64,
    /// Candles per request, capped at 200 by Upbit
    pub batch_size: usize,
}

impl Default for UpbitConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://api.upbit.com/v1".to_string(),
            request_timeout_secs: 10,
            request_delay_ms: 120,
            batch_size: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Comma-separated origins, or "*" for any
    pub cors_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: "*".to_string(),
        }
    }
}

impl ServerConfig {
    /// Parsed origin list; `None` means any origin
    pub fn allowed_origins(&self) -> Option<Vec<String>> {
        if self.cors_origins.trim() == "*" {
            return None;
        }
        Some(
            self.cors_origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.4,
            max_output_tokens: 1024,
            request_timeout_secs: 60,
            cache_ttl_secs: 600,
        }
    }
}

impl AiConfig {
    /// Configured key, falling back to `GEMINI_API_KEY`
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestDefaults {
    pub symbol: String,
    pub k: f64,
    pub fee_rate: f64,
    pub days: usize,
    pub use_ma_filter: bool,
    pub symbols: Vec<String>,
}

impl Default for BacktestDefaults {
    fn default() -> Self {
        Self {
            symbol: "KRW-BTC".to_string(),
            k: DEFAULT_K,
            fee_rate: DEFAULT_FEE_RATE,
            days: 100,
            use_ma_filter: true,
            symbols: ["KRW-BTC", "KRW-ETH", "KRW-SOL", "KRW-XRP", "KRW-DOGE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl BacktestDefaults {
    pub fn params(&self) -> StrategyParameters {
        StrategyParameters::new(self.k, self.fee_rate, self.use_ma_filter).with_lookback(self.days)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let settings = ConfigLoader::builder()
            .add_source(File::from(config_path.clone()).required(false))
            .add_source(
                config::Environment::with_prefix("QUANTDASH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn config_path() -> PathBuf {
        // Try local config first, then default
        let local_config = PathBuf::from("config/default.toml");
        if local_config.exists() {
            return local_config;
        }

        // Fallback to executable directory
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let exe_config = exe_dir.join("config/default.toml");
                if exe_config.exists() {
                    return exe_config;
                }
            }
        }

        local_config
    }

    /// Whether a symbol is in the supported market list
    pub fn is_supported_symbol(&self, symbol: &str) -> bool {
        self.backtest.symbols.iter().any(|s| s == symbol)
    }
}
