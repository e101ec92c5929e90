use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dex_analytics::app::{self, Components};
use dex_analytics::config::{default_config_path, ResolvedConfig};
use dex_analytics::duration::format_duration;
use dex_analytics::scheduler::Scheduler;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "dex-analyticsd")]
#[command(about = "Collects balances and prices from DEX markets on a schedule")]
struct Cli {
    /// Path to config file.
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Wait one discovery interval before the first discovery round.
    #[arg(long)]
    no_discovery_on_start: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;
    info!(
        config = %cli.config.display(),
        data_dir = %config.data_dir.display(),
        balance_interval = %format_duration(config.jobs.balance_interval),
        price_interval = %format_duration(config.jobs.price_interval),
        discovery_interval = %format_duration(config.jobs.discovery_interval),
        "starting dex-analytics daemon"
    );

    let components = Components::from_config(&config)?;
    let rates = Arc::new(app::connect_rates(&config).await?);

    let mut scheduler = Scheduler::new();
    app::register_jobs(
        &mut scheduler,
        &config,
        &components,
        rates,
        !cli.no_discovery_on_start,
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown requested");
    scheduler.shutdown();

    Ok(())
}
