use anyhow::Result;
use quantdash::{config::Config, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quantdash=info,tower_http=info".into()),
        )
        .init();

    tracing::info!("Starting breakout backtest server");

    let config = Config::load()?;
    tracing::info!(
        "Loaded config: upbit={}, ai={} ({}), {} markets",
        config.upbit.rest_url,
        if config.ai.enabled { "enabled" } else { "disabled" },
        config.ai.model,
        config.backtest.symbols.len()
    );

    server::serve(config).await
}
