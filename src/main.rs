use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dex_analytics::app::{self, Components};
use dex_analytics::config::{default_config_path, ResolvedConfig};
use dex_analytics::models::{AssetId, MarketFilter, MarketId, Page};
use dex_analytics::period::{PredefinedPeriod, TimeFrame, TimeRange};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dex-analytics")]
#[command(about = "Query balances and prices collected from DEX markets")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Page size; 0 returns everything
    #[arg(long, default_value_t = 0)]
    size: u32,
}

impl PageArgs {
    fn page(&self) -> Page {
        Page::new(self.page, self.size)
    }
}

#[derive(Args)]
struct RangeArgs {
    /// Named period: last-hour, last-day, last-month, last-three-months, ytd, all
    #[arg(long, conflicts_with = "from")]
    period: Option<PredefinedPeriod>,

    /// Custom window start (RFC3339)
    #[arg(long)]
    from: Option<String>,

    /// Custom window end (RFC3339); defaults to now
    #[arg(long, requires = "from")]
    to: Option<String>,

    /// Bucket width: auto, hour, four-hours, day, week, month
    #[arg(long, default_value = "auto")]
    frame: TimeFrame,

    /// Restrict to these market ids (repeatable)
    #[arg(long = "market")]
    markets: Vec<MarketId>,
}

impl RangeArgs {
    fn time_range(&self) -> TimeRange {
        match (&self.period, &self.from) {
            (_, Some(from)) => TimeRange::custom(from.clone(), self.to.clone().unwrap_or_default()),
            (Some(period), None) => TimeRange::predefined(*period),
            (None, None) => TimeRange::predefined(PredefinedPeriod::LastDay),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show the resolved configuration
    Config,

    /// List tracked markets
    Markets {
        /// Only markets served from this URL
        #[arg(long)]
        url: Option<String>,

        /// Only markets with this base asset
        #[arg(long)]
        base: Option<String>,

        /// Only markets with this quote asset
        #[arg(long)]
        quote: Option<String>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Bucketed balance history
    Balances {
        #[command(flatten)]
        range: RangeArgs,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Bucketed price history, normalized into a reference currency
    Prices {
        #[command(flatten)]
        range: RangeArgs,

        /// Reference currency (e.g. EUR); empty skips normalization
        #[arg(long, default_value = "")]
        currency: String,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Run one discovery round and reconcile the catalog
    Discover,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn market_filter(
    url: Option<String>,
    base: Option<String>,
    quote: Option<String>,
) -> Vec<MarketFilter> {
    if url.is_none() && base.is_none() && quote.is_none() {
        return Vec::new();
    }
    vec![MarketFilter {
        url,
        base_asset: base.map(AssetId::from_string),
        quote_asset: quote.map(AssetId::from_string),
    }]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;

    match cli.command {
        Command::Config => print_json(&app::config_output(&cli.config, &config))?,
        Command::Markets {
            url,
            base,
            quote,
            page,
        } => {
            let components = Components::from_config(&config)?;
            let filters = market_filter(url, base, quote);
            let markets = components
                .market_service()
                .list_markets(&filters, page.page())
                .await?;
            print_json(&markets)?;
        }
        Command::Balances { range, page } => {
            let components = Components::from_config(&config)?;
            let balances = components
                .balance_service()
                .get_balances(&range.time_range(), page.page(), range.frame, &range.markets)
                .await?;
            print_json(&balances)?;
        }
        Command::Prices {
            range,
            currency,
            page,
        } => {
            let components = Components::from_config(&config)?;
            let rates = Arc::new(app::connect_rates(&config).await?);
            let prices = components
                .price_service(rates)
                .get_prices(
                    &range.time_range(),
                    page.page(),
                    &currency,
                    range.frame,
                    &range.markets,
                )
                .await?;
            print_json(&prices)?;
        }
        Command::Discover => {
            let components = Components::from_config(&config)?;
            let report = components.market_service().discover_and_reconcile().await?;
            print_json(&report)?;
        }
    }

    Ok(())
}
