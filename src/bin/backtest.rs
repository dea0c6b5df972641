//! Backtest CLI
//!
//! Run the volatility breakout backtest on Upbit daily candles or a local
//! JSON bar file.
//! Usage:
//!   cargo run --bin backtest -- run --symbol KRW-BTC --k 0.5 --days 200
//!   cargo run --bin backtest -- sweep --symbol KRW-ETH --from 0.3 --to 0.7 --step 0.1
//!   cargo run --bin backtest -- ticker --symbol KRW-BTC

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use quantdash::api::UpbitClient;
use quantdash::backtest::{
    compare_k_values, k_grid, AggregateMetrics, BacktestEngine, BacktestResult, DailyResult, KSweepResult,
    TradeSummary,
};
use quantdash::config::Config;
use quantdash::data::PriceBar;
use quantdash::strategy::StrategyParameters;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "backtest")]
#[command(about = "Volatility breakout backtests on daily crypto candles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Upbit market code (e.g., KRW-BTC); defaults to the configured symbol
    #[arg(short, long)]
    symbol: Option<String>,

    /// Days to backtest; defaults to the configured lookback
    #[arg(short, long)]
    days: Option<usize>,

    /// Per-side fee rate (0.0005 = 0.05%)
    #[arg(short, long)]
    fee: Option<f64>,

    /// Disable the MA5 trend filter
    #[arg(long)]
    no_ma_filter: bool,

    /// Read bars from a JSON file instead of Upbit
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single backtest
    Run {
        #[command(flatten)]
        data: DataArgs,

        /// Breakout sensitivity K
        #[arg(short, long)]
        k: Option<f64>,

        /// Show the last N daily rows
        #[arg(long)]
        rows: Option<usize>,

        /// Show equity curve
        #[arg(long)]
        equity: bool,

        /// Export daily rows to CSV file
        #[arg(long)]
        export: Option<String>,
    },

    /// Compare a range of K values on the same bars
    Sweep {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long, default_value = "0.3")]
        from: f64,

        #[arg(long, default_value = "0.7")]
        to: f64,

        #[arg(long, default_value = "0.1")]
        step: f64,

        /// Export results to CSV file
        #[arg(long)]
        export: Option<String>,
    },

    /// Show today's live target and trend state
    Ticker {
        #[arg(short, long)]
        symbol: Option<String>,

        #[arg(short, long)]
        k: Option<f64>,
    },

    /// List configured markets
    Markets,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quantdash=info".parse()?)
                .add_directive("backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Run {
            data,
            k,
            rows,
            equity,
            export,
        } => run_single_backtest(&config, &data, k, rows, equity, export.as_deref()).await,

        Commands::Sweep {
            data,
            from,
            to,
            step,
            export,
        } => run_sweep(&config, &data, from, to, step, export.as_deref()).await,

        Commands::Ticker { symbol, k } => {
            let symbol = symbol.unwrap_or_else(|| config.backtest.symbol.clone());
            show_ticker(&config, &symbol, k.unwrap_or(config.backtest.k)).await
        }

        Commands::Markets => {
            println!("\nConfigured markets:");
            for symbol in &config.backtest.symbols {
                let marker = if *symbol == config.backtest.symbol { " (default)" } else { "" };
                println!("  - {}{}", symbol, marker);
            }
            println!("\nUsage: backtest run --symbol KRW-ETH --k 0.5");
            Ok(())
        }
    }
}

impl DataArgs {
    fn symbol(&self, config: &Config) -> String {
        let symbol = self
            .symbol
            .clone()
            .unwrap_or_else(|| config.backtest.symbol.clone());
        if self.input.is_none() && !config.is_supported_symbol(&symbol) {
            tracing::warn!("{} is not in the configured market list", symbol);
        }
        symbol
    }

    fn params(&self, config: &Config, k: Option<f64>) -> StrategyParameters {
        let mut params = config.backtest.params();
        if let Some(k) = k {
            params.k = k;
        }
        if let Some(fee) = self.fee {
            params.fee_rate = fee;
        }
        if let Some(days) = self.days {
            params.lookback_days = days;
        }
        if self.no_ma_filter {
            params.use_ma_filter = false;
        }
        params
    }
}

async fn load_bars(
    config: &Config,
    data: &DataArgs,
    symbol: &str,
    params: &StrategyParameters,
) -> Result<Vec<PriceBar>> {
    if let Some(path) = &data.input {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let bars: Vec<PriceBar> =
            serde_json::from_str(&content).with_context(|| format!("Invalid bar file {}", path.display()))?;
        tracing::info!("Loaded {} bars from {}", bars.len(), path.display());
        return Ok(bars);
    }

    let client = UpbitClient::new(&config.upbit)?;
    client.fetch_daily_candles(symbol, params.bars_needed()).await
}

async fn run_single_backtest(
    config: &Config,
    data: &DataArgs,
    k: Option<f64>,
    rows: Option<usize>,
    show_equity: bool,
    export: Option<&str>,
) -> Result<()> {
    let symbol = data.symbol(config);
    let params = data.params(config, k);
    let bars = load_bars(config, data, &symbol, &params).await?;

    let engine = BacktestEngine::new(params);
    let results = engine.run_checked(&bars)?;
    if results.is_empty() {
        bail!(
            "Not enough data: {} bars loaded, need more than {}",
            bars.len(),
            params.min_window()
        );
    }
    let result = BacktestResult::from_results(params, results);

    print_header(&symbol);
    print_setup(&params, &bars);
    print_performance(&result.metrics);
    print_returns(&result.metrics);
    print_risk(&result.metrics, &result.trade_summary);
    print_footer();

    if let Some(n) = rows {
        println!();
        print_rows(&result.results, n);
    }

    if show_equity {
        println!();
        print_equity_curve(&result);
    }

    if let Some(path) = export {
        result.export_csv(path)?;
        println!("\nExported to: {}", path);
    }

    Ok(())
}

async fn run_sweep(
    config: &Config,
    data: &DataArgs,
    from: f64,
    to: f64,
    step: f64,
    export: Option<&str>,
) -> Result<()> {
    let symbol = data.symbol(config);
    let base = data.params(config, None);
    let bars = load_bars(config, data, &symbol, &base).await?;

    let ks = k_grid(from, to, step);
    for &k in &ks {
        base.with_k(k).validate()?;
    }

    let sweep = compare_k_values(&bars, base, &ks);
    print_sweep_results(&symbol, &sweep);

    if let Some(path) = export {
        sweep.export_csv(path)?;
        println!("\nExported to: {}", path);
    }

    Ok(())
}

async fn show_ticker(config: &Config, symbol: &str, k: f64) -> Result<()> {
    let client = UpbitClient::new(&config.upbit)?;
    let ticker = client.fetch_ticker(symbol, k).await?;

    let change_color = if ticker.change_rate >= 0.0 { "\x1b[32m" } else { "\x1b[31m" };

    println!();
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(55));
    println!("\x1b[1;36m         LIVE TICKER: {}\x1b[0m", ticker.symbol);
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(55));
    println!(
        "  Current:          {:.2} {}({:+.2}%)\x1b[0m",
        ticker.current_price,
        change_color,
        ticker.change_rate * 100.0
    );
    println!("  Open / High / Low: {:.2} / {:.2} / {:.2}", ticker.opening_price, ticker.high_price, ticker.low_price);
    println!("  Target (k={:.2}):  {:.2}", k, ticker.target_price);
    println!("  MA5:              {:.2}", ticker.ma5);
    println!("  To target:        {:+.2}%", ticker.distance_to_target_pct());
    println!(
        "  Signal:           {}",
        match (ticker.is_breakout(), ticker.trend_ok()) {
            (true, true) => "\x1b[1;32mBREAKOUT\x1b[0m",
            (true, false) => "\x1b[33mbreakout below MA5\x1b[0m",
            (false, _) => "waiting",
        }
    );
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(55));
    Ok(())
}

fn print_sweep_results(symbol: &str, result: &KSweepResult) {
    println!();
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(70));
    println!("\x1b[1;36m                    K SWEEP: {}\x1b[0m", symbol);
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(70));
    println!(
        "Bars: {} | Fee: {:.4}% | MA5 filter: {}",
        result.bars_count,
        result.base.fee_rate * 100.0,
        if result.base.use_ma_filter { "on" } else { "off" }
    );
    println!();

    println!("┌{:─<8}┬{:─>8}┬{:─>10}┬{:─>11}┬{:─>11}┬{:─>11}┐", "", "", "", "", "", "");
    println!(
        "│ {:>6} │ {:>6} │ {:>8} │ {:>9} │ {:>9} │ {:>9} │",
        "K", "Trades", "Win Rate", "Return", "CAGR", "Drawdown"
    );
    println!("├{:─<8}┼{:─>8}┼{:─>10}┼{:─>11}┼{:─>11}┼{:─>11}┤", "", "", "", "", "", "");

    for (k, backtest_result) in &result.results {
        let m = &backtest_result.metrics;
        let color = if m.total_return_pct >= 0.0 { "\x1b[32m" } else { "\x1b[31m" };

        println!(
            "│ {:>6.2} │ {:>6} │ {:>7.1}% │ {}{:>+8.2}%\x1b[0m │ {:>8} │ {:>8.2}% │",
            k,
            m.trade_count,
            m.win_rate_pct(),
            color,
            m.total_return_pct,
            format_pct(m.cagr_pct),
            m.max_drawdown_pct
        );
    }

    println!("└{:─<8}┴{:─>8}┴{:─>10}┴{:─>11}┴{:─>11}┴{:─>11}┘", "", "", "", "", "", "");

    if let Some((k, best)) = result.best_by_return() {
        println!();
        println!(
            "\x1b[1;32mBest K by return: {:.2} ({:+.2}%, {:.2}% drawdown)\x1b[0m",
            k, best.metrics.total_return_pct, best.metrics.max_drawdown_pct
        );
    }
    if let Some((k, best)) = result.best_by_drawdown() {
        println!(
            "Shallowest drawdown: k={:.2} ({:.2}% drawdown, {:+.2}%)",
            k, best.metrics.max_drawdown_pct, best.metrics.total_return_pct
        );
    }

    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(70));
}

fn print_header(symbol: &str) {
    println!();
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(55));
    println!("\x1b[1;36m         BACKTEST RESULTS: {}\x1b[0m", symbol);
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(55));
}

fn print_setup(params: &StrategyParameters, bars: &[PriceBar]) {
    if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
        println!("Period: {} → {} ({} bars)", first.date_label(), last.date_label(), bars.len());
    }
    println!(
        "K: {:.2} | Fee: {:.4}% per side | MA5 filter: {}",
        params.k,
        params.fee_rate * 100.0,
        if params.use_ma_filter { "on" } else { "off" }
    );
    println!();
}

fn print_performance(metrics: &AggregateMetrics) {
    println!("\x1b[1;33mPERFORMANCE\x1b[0m");
    println!("  Days Evaluated:   {}", metrics.total_days);
    println!("  Total Trades:     {}", metrics.trade_count);
    println!(
        "  Win Rate:         {:.1}%  ({} wins / {} losses)",
        metrics.win_rate_pct(),
        metrics.winning_trades,
        metrics.losing_trades
    );
    println!();
}

fn print_returns(metrics: &AggregateMetrics) {
    println!("\x1b[1;33mRETURNS\x1b[0m");

    let color = if metrics.total_return_pct >= 0.0 { "\x1b[32m" } else { "\x1b[31m" };

    println!("  Total Return:     {}{:+.2}%\x1b[0m", color, metrics.total_return_pct);
    println!("  CAGR:             {}", format_pct(metrics.cagr_pct));
    println!("  Final Multiplier: {:.4}x", metrics.final_multiplier);
    println!();
}

fn print_risk(metrics: &AggregateMetrics, summary: &TradeSummary) {
    println!("\x1b[1;33mRISK\x1b[0m");
    println!("  Max Drawdown:     {:.2}%", metrics.max_drawdown_pct);
    println!("  Avg Trade:        {:+.3}%", summary.avg_trade_return_pct);
    println!("  Best Trade:       {:+.2}%", summary.best_trade_pct);
    println!("  Worst Trade:      {:+.2}%", summary.worst_trade_pct);
    println!(
        "  Streaks:          {} wins / {} losses",
        summary.max_consecutive_wins, summary.max_consecutive_losses
    );
    println!("  Exposure:         {:.1}% of days", summary.exposure_pct);
}

fn print_footer() {
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(55));
}

fn print_rows(results: &[DailyResult], n: usize) {
    println!("\x1b[1;33mDAILY RESULTS (last {})\x1b[0m", n.min(results.len()));
    println!(
        "{:<12} {:>14} {:>14} {:>14} {:>6} {:>9} {:>10}",
        "Date", "Close", "Target", "MA5", "Buy", "Return", "Equity"
    );
    println!("{}", "-".repeat(85));

    let start = results.len().saturating_sub(n);
    for r in &results[start..] {
        let ma5 = r.ma5.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string());
        let (buy, color) = if r.is_bought {
            ("BUY", if r.return_pct >= 0.0 { "\x1b[32m" } else { "\x1b[31m" })
        } else {
            ("-", "")
        };

        println!(
            "{:<12} {:>14.2} {:>14.2} {:>14} {}{:>6} {:>+8.2}%\x1b[0m {:>10.4}",
            r.date, r.close_price, r.target_price, ma5, color, buy, r.return_pct, r.cumulative_multiplier
        );
    }
}

fn print_equity_curve(result: &BacktestResult) {
    println!("\x1b[1;33mEQUITY CURVE (sampled)\x1b[0m");

    let curve = result.equity_curve();
    let sample_rate = (curve.len() / 20).max(1);

    for (i, (date, multiplier)) in curve.iter().enumerate() {
        if i % sample_rate == 0 || i == curve.len() - 1 {
            println!("  {} {:.4}x", date, multiplier);
        }
    }
}

fn format_pct(value: f64) -> String {
    if value.is_finite() {
        format!("{:+.2}%", value)
    } else {
        "N/A".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_default_grid() {
        let cli = Cli::try_parse_from(["backtest", "sweep"]).unwrap();
        match cli.command {
            Commands::Sweep { from, to, step, .. } => {
                assert_eq!(k_grid(from, to, step), vec![0.3, 0.4, 0.5, 0.6, 0.7]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_configured_defaults() {
        let cli = Cli::try_parse_from(["backtest", "run", "--days", "30", "--no-ma-filter", "-k", "0.4"]).unwrap();
        let Commands::Run { data, k, .. } = cli.command else {
            panic!("expected run");
        };
        let params = data.params(&Config::default(), k);

        assert_eq!(params.k, 0.4);
        assert!(!params.use_ma_filter);
        assert_eq!(params.fee_rate, Config::default().backtest.fee_rate);
        assert_eq!(params.bars_needed(), 31);
    }
}
