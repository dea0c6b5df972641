//! Prompt construction for the strategy report

use super::AiReportRequest;
use std::fmt::Write;

const INSTRUCTIONS: &str = "You are a quantitative trading analyst reviewing a backtest of \
Larry Williams' volatility breakout strategy on a cryptocurrency. Each day the strategy buys \
when price exceeds today's open plus K times yesterday's high-low range, and sells at the \
close. Be concrete, reference the numbers, and do not give financial advice.";

const OUTPUT_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{
  "summary": "2-3 sentence assessment",
  "risks": ["..."],
  "parameterSuggestions": ["..."],
  "whatToWatch": ["..."]
}"#;

/// Deterministic prompt text for a report request
pub fn build_prompt(request: &AiReportRequest) -> String {
    let m = &request.metrics;
    let t = &request.trade_summary;
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\n## Setup\n");
    let _ = writeln!(prompt, "- Market: {}", request.symbol);
    let _ = writeln!(prompt, "- K value: {:.2}", request.k);
    let _ = writeln!(prompt, "- Fee per side: {:.4}%", request.fee * 100.0);
    let _ = writeln!(prompt, "- Lookback: {} days", request.days);
    let _ = writeln!(
        prompt,
        "- MA5 trend filter: {}",
        if request.use_ma_filter { "on" } else { "off" }
    );

    prompt.push_str("\n## Results\n");
    let _ = writeln!(prompt, "- Sessions evaluated: {}", m.total_days);
    let _ = writeln!(prompt, "- Trades: {} ({} wins, {} losses)", m.trade_count, m.winning_trades, m.losing_trades);
    let _ = writeln!(prompt, "- Win rate: {:.1}%", m.win_rate_pct());
    let _ = writeln!(prompt, "- Total return: {:+.2}%", m.total_return_pct);
    let _ = writeln!(prompt, "- CAGR: {:+.2}%", m.cagr_pct);
    let _ = writeln!(prompt, "- Max drawdown: {:.2}%", m.max_drawdown_pct);
    let _ = writeln!(prompt, "- Average trade: {:+.3}%", t.avg_trade_return_pct);
    let _ = writeln!(prompt, "- Best / worst trade: {:+.2}% / {:+.2}%", t.best_trade_pct, t.worst_trade_pct);
    let _ = writeln!(
        prompt,
        "- Longest streaks: {} wins, {} losses",
        t.max_consecutive_wins, t.max_consecutive_losses
    );
    let _ = writeln!(prompt, "- Market exposure: {:.1}% of days", t.exposure_pct);
    if let (Some(first), Some(last)) = (&t.first_date, &t.last_date) {
        let _ = writeln!(prompt, "- Period: {} to {}", first, last);
    }

    prompt.push('\n');
    prompt.push_str(OUTPUT_FORMAT);
    prompt
}
