//! Composition root shared by the CLI and the daemon.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::ResolvedConfig;
use crate::fetcher::{HttpMarketFetcher, MarketDataFetcher};
use crate::rates::providers::coingecko::CoinGeckoSource;
use crate::rates::providers::frankfurter::FrankfurterSource;
use crate::rates::{ExchangeRateClient, RateClientOptions, RateService};
use crate::scheduler::{BalanceFetchJob, DiscoveryJob, PriceFetchJob, Scheduler};
use crate::service::{BalanceService, MarketService, PriceService};
use crate::storage::{JsonMarketCatalog, JsonlTimeSeriesStore, MarketCatalog, TimeSeriesStore};

/// Stores and fetcher every service is built from.
#[derive(Clone)]
pub struct Components {
    pub store: Arc<dyn TimeSeriesStore>,
    pub catalog: Arc<dyn MarketCatalog>,
    pub fetcher: Arc<dyn MarketDataFetcher>,
    max_concurrent_fetches: usize,
}

impl Components {
    /// File-backed stores under `data_dir` and the HTTP market fetcher.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let fetcher =
            HttpMarketFetcher::new(&config.fetcher).context("Failed to build market fetcher")?;
        Ok(Self {
            store: Arc::new(JsonlTimeSeriesStore::new(&config.data_dir)),
            catalog: Arc::new(JsonMarketCatalog::new(&config.data_dir)),
            fetcher: Arc::new(fetcher),
            max_concurrent_fetches: config.jobs.max_concurrent_fetches,
        })
    }

    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        catalog: Arc<dyn MarketCatalog>,
        fetcher: Arc<dyn MarketDataFetcher>,
    ) -> Self {
        Self {
            store,
            catalog,
            fetcher,
            max_concurrent_fetches: crate::config::JobsConfig::default().max_concurrent_fetches,
        }
    }

    pub fn balance_service(&self) -> BalanceService {
        BalanceService::new(self.store.clone(), self.catalog.clone(), self.fetcher.clone())
            .with_max_concurrent_fetches(self.max_concurrent_fetches)
    }

    pub fn price_service(&self, rates: Arc<dyn RateService>) -> PriceService {
        PriceService::new(
            self.store.clone(),
            self.catalog.clone(),
            self.fetcher.clone(),
            rates,
        )
        .with_max_concurrent_fetches(self.max_concurrent_fetches)
    }

    pub fn market_service(&self) -> MarketService {
        MarketService::new(self.catalog.clone(), self.fetcher.clone())
    }
}

/// Connects the exchange-rate client to the configured CoinGecko and Frankfurter hosts.
pub async fn connect_rates(config: &ResolvedConfig) -> Result<ExchangeRateClient> {
    let crypto = CoinGeckoSource::new().with_base_url(&config.rates.crypto_base_url);
    let fiat = FrankfurterSource::new().with_base_url(&config.rates.fiat_base_url);
    let client = ExchangeRateClient::connect(
        Arc::new(crypto),
        Arc::new(fiat),
        config.assets.clone(),
        RateClientOptions::from(&config.rates),
    )
    .await
    .context("Failed to load supported fiat symbols")?;
    Ok(client)
}

/// Registers discovery, balance and price jobs at their configured intervals.
pub fn register_jobs(
    scheduler: &mut Scheduler,
    config: &ResolvedConfig,
    components: &Components,
    rates: Arc<dyn RateService>,
    discovery_on_start: bool,
) {
    scheduler.register_periodic(
        config.jobs.discovery_interval,
        Arc::new(DiscoveryJob::new(components.market_service())),
        discovery_on_start,
    );
    scheduler.register_periodic(
        config.jobs.balance_interval,
        Arc::new(BalanceFetchJob::new(components.balance_service())),
        false,
    );
    scheduler.register_periodic(
        config.jobs.price_interval,
        Arc::new(PriceFetchJob::new(components.price_service(rates))),
        false,
    );
}

pub fn config_output(config_path: &Path, config: &ResolvedConfig) -> serde_json::Value {
    serde_json::json!({
        "config_file": config_path.display().to_string(),
        "config": config,
    })
}
