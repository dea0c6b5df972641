//! AI narrative reports on backtest results

mod cache;
mod gemini;
mod prompt;

pub use cache::ReportCache;
pub use gemini::{GeminiClient, TextGenerator};
pub use prompt::build_prompt;

use crate::backtest::{AggregateMetrics, TradeSummary};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Structured commentary returned by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiReport {
    pub summary: String,
    pub risks: Vec<String>,
    pub parameter_suggestions: Vec<String>,
    pub what_to_watch: Vec<String>,
}

/// Backtest setup and statistics sent for commentary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiReportRequest {
    pub symbol: String,
    pub k: f64,
    pub fee: f64,
    pub days: u32,
    pub use_ma_filter: bool,
    pub metrics: AggregateMetrics,
    pub trade_summary: TradeSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiReportResponse {
    pub report: Option<AiReport>,
    pub cached: bool,
}

/// Parse model output into a report.
///
/// Accepts bare JSON or JSON wrapped in a Markdown code fence. Anything that
/// does not parse becomes the summary with empty lists.
pub fn parse_report(text: &str) -> AiReport {
    let body = strip_code_fence(text.trim());

    let candidate = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    };

    match serde_json::from_str::<AiReport>(candidate) {
        Ok(report) => report,
        Err(e) => {
            debug!("Report is not JSON ({}), using raw text", e);
            AiReport {
                summary: text.trim().to_string(),
                ..Default::default()
            }
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Generator plus cache, shared across requests
pub struct ReportService {
    generator: Arc<dyn TextGenerator>,
    cache: RwLock<ReportCache>,
}

impl ReportService {
    pub fn new(generator: Arc<dyn TextGenerator>, ttl: Duration) -> Self {
        Self {
            generator,
            cache: RwLock::new(ReportCache::new(ttl)),
        }
    }

    /// Report for a request, served from cache when fresh
    pub async fn report(&self, request: &AiReportRequest) -> Result<AiReportResponse> {
        if request.metrics.total_days == 0 {
            return Ok(AiReportResponse {
                report: None,
                cached: false,
            });
        }

        let key = ReportCache::key_for(request);
        if let Some(report) = self.cache.read().await.get(&key) {
            debug!("Report cache hit for {}", request.symbol);
            return Ok(AiReportResponse {
                report: Some(report),
                cached: true,
            });
        }

        let prompt = build_prompt(request);
        let text = self.generator.generate(&prompt).await?;
        let report = parse_report(&text);
        info!(
            "Generated report for {} (k={:.2}) via {}",
            request.symbol,
            request.k,
            self.generator.name()
        );

        self.cache.write().await.insert(key, report.clone());
        Ok(AiReportResponse {
            report: Some(report),
            cached: false,
        })
    }
}
