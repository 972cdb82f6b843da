mod bot;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use confluence_trading_bot::analysis::HeuristicAnalysisSource;
use confluence_trading_bot::config::Config;
use confluence_trading_bot::exchange::CoinbaseClient;

use crate::bot::ConfluenceBot;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    cfg.validate().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let market = Box::new(CoinbaseClient::new(&cfg));
    let analysis = Box::new(HeuristicAnalysisSource::new());
    let shared_config = cfg.shared();

    let mut bot = ConfluenceBot::new(shared_config, market, analysis).await;
    bot.run().await?;

    Ok(())
}
