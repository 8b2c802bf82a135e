//! Development ledger node.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vdr_ledger::LedgerConfig;

#[derive(Parser)]
#[command(name = "vdr-ledger")]
#[command(about = "In-memory VDR ledger node for local development", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration
    #[arg(long)]
    listen: Option<String>,

    /// Chain id, overrides the configuration
    #[arg(long)]
    chain_id: Option<u64>,

    /// Block interval in milliseconds; 0 disables automatic blocks
    #[arg(long)]
    block_time_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = LedgerConfig::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    if let Some(chain_id) = cli.chain_id {
        config.chain_id = chain_id;
    }
    if let Some(block_time_ms) = cli.block_time_ms {
        config.block_time_ms = block_time_ms;
    }

    init_logging(&config)?;

    let handle = vdr_ledger::spawn(&config).await?;
    info!(url = %handle.url(), block_time_ms = config.block_time_ms, "ledger ready");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

fn init_logging(config: &LedgerConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}
