#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dex_analytics::error::{AnalyticsError, RateError};
use dex_analytics::fetcher::{BalanceReading, MarketDataFetcher, PriceReading, ProviderMarkets};
use dex_analytics::models::{AssetId, DiscoveredMarket, Market, MarketId};
use dex_analytics::rates::{CoinListing, CryptoRateSource, FiatRateSource, FiatRateTable, RateService};
use dex_analytics::service::{FetchErrorSink, FetchKind};
use rust_decimal::Decimal;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// 64-char hex asset id made of one repeated digit.
pub fn asset(c: char) -> AssetId {
    AssetId::parse(&c.to_string().repeat(64)).unwrap()
}

pub fn market(id: u64, url: &str, base: char, quote: char) -> Market {
    Market {
        id: MarketId::new(id),
        provider_name: "mock".to_string(),
        url: url.to_string(),
        base_asset: asset(base),
        quote_asset: asset(quote),
        active: true,
    }
}

pub fn discovered(url: &str, base: char, quote: char) -> DiscoveredMarket {
    DiscoveredMarket::new("mock", url, asset(base), asset(quote))
}

/// Crypto source with fixed quotes that counts every call.
#[derive(Default)]
pub struct CountingCryptoSource {
    pub coins: Vec<CoinListing>,
    pub prices: Mutex<HashMap<(String, String), Decimal>>,
    pub coin_list_calls: AtomicUsize,
    pub price_calls: AtomicUsize,
}

impl CountingCryptoSource {
    pub fn new(coin_ids: &[&str]) -> Self {
        Self {
            coins: coin_ids
                .iter()
                .map(|id| CoinListing {
                    id: id.to_string(),
                    symbol: id.chars().take(3).collect(),
                    name: id.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_price(self, coin: &str, fiat: &str, price: Decimal) -> Self {
        self.set_price(coin, fiat, price);
        self
    }

    pub fn set_price(&self, coin: &str, fiat: &str, price: Decimal) {
        self.prices
            .lock()
            .unwrap()
            .insert((coin.to_string(), fiat.to_string()), price);
    }

    pub fn coin_list_calls(&self) -> usize {
        self.coin_list_calls.load(Ordering::SeqCst)
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CryptoRateSource for CountingCryptoSource {
    async fn coin_list(&self) -> Result<Vec<CoinListing>> {
        self.coin_list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.coins.clone())
    }

    async fn simple_price(&self, coin_id: &str, vs_currency: &str) -> Result<Decimal> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up behind the refresh lock.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        Ok(self
            .prices
            .lock()
            .unwrap()
            .get(&(coin_id.to_string(), vs_currency.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    fn name(&self) -> &str {
        "counting-crypto"
    }
}

/// Fiat source serving canned tables; can be switched to failing.
#[derive(Default)]
pub struct CountingFiatSource {
    pub codes: Vec<String>,
    pub tables: Mutex<HashMap<String, FiatRateTable>>,
    pub latest_calls: AtomicUsize,
    pub failing: AtomicBool,
}

impl CountingFiatSource {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            codes: codes.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Adds a table quoted against `base`, e.g. `("USD", [("EUR", 0.9)])`.
    pub fn with_table(self, base: &str, rates: &[(&str, Decimal)]) -> Self {
        self.tables.lock().unwrap().insert(
            base.to_string(),
            FiatRateTable {
                base: base.to_string(),
                rates: rates.iter().map(|(c, r)| (c.to_string(), *r)).collect(),
            },
        );
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FiatRateSource for CountingFiatSource {
    async fn currencies(&self) -> Result<Vec<String>> {
        Ok(self.codes.clone())
    }

    async fn latest_rates(&self, base: &str) -> Result<FiatRateTable> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("forex source unavailable"));
        }
        self.tables
            .lock()
            .unwrap()
            .get(base)
            .cloned()
            .ok_or_else(|| anyhow!("no table for {base}"))
    }

    fn name(&self) -> &str {
        "counting-fiat"
    }
}

/// Rate service with a fixed conversion table that counts conversions.
#[derive(Default)]
pub struct StubRates {
    pub fiat: HashSet<String>,
    pub assets: HashMap<String, String>,
    pub rates: HashMap<(String, String), Decimal>,
    pub convert_calls: AtomicUsize,
}

impl StubRates {
    pub fn new(fiat: &[&str]) -> Self {
        Self {
            fiat: fiat.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_asset(mut self, asset: &AssetId, ticker: &str) -> Self {
        self.assets.insert(asset.to_string(), ticker.to_string());
        self
    }

    pub fn with_rate(mut self, source: &str, target: &str, rate: Decimal) -> Self {
        self.rates
            .insert((source.to_string(), target.to_string()), rate);
        self
    }

    pub fn convert_calls(&self) -> usize {
        self.convert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateService for StubRates {
    async fn convert_currency(&self, source: &str, target: &str) -> Result<Decimal, RateError> {
        self.convert_calls.fetch_add(1, Ordering::SeqCst);
        if source == target {
            return Ok(Decimal::ONE);
        }
        self.rates
            .get(&(source.to_string(), target.to_string()))
            .copied()
            .ok_or(RateError::CurrencyNotFound)
    }

    fn is_fiat_symbol_supported(&self, symbol: &str) -> bool {
        self.fiat.contains(symbol)
    }

    fn asset_currency(&self, asset: &str) -> Result<String, RateError> {
        self.assets
            .get(asset)
            .cloned()
            .ok_or_else(|| RateError::AssetNotFound(asset.to_string()))
    }
}

/// Fetcher answering from canned readings keyed by market url.
#[derive(Default)]
pub struct ScriptedFetcher {
    pub providers: Mutex<Vec<ProviderMarkets>>,
    pub balances: Mutex<HashMap<String, BalanceReading>>,
    pub prices: Mutex<HashMap<String, PriceReading>>,
    pub discovery_fails: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_discovered(&self, markets: Vec<DiscoveredMarket>) {
        *self.providers.lock().unwrap() = vec![ProviderMarkets {
            provider: "mock".to_string(),
            endpoint: "https://mock.example".to_string(),
            markets,
        }];
    }

    pub fn with_balance(self, url: &str, base: Decimal, quote: Decimal) -> Self {
        self.balances.lock().unwrap().insert(
            url.to_string(),
            BalanceReading {
                base_balance: base,
                quote_balance: quote,
            },
        );
        self
    }

    pub fn with_price(self, url: &str, base: Decimal, quote: Decimal) -> Self {
        self.prices.lock().unwrap().insert(
            url.to_string(),
            PriceReading {
                base_price: base,
                quote_price: quote,
            },
        );
        self
    }
}

#[async_trait]
impl MarketDataFetcher for ScriptedFetcher {
    async fn fetch_providers_markets(&self) -> Result<Vec<ProviderMarkets>> {
        if self.discovery_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("registry unavailable"));
        }
        Ok(self.providers.lock().unwrap().clone())
    }

    async fn fetch_balance(&self, market: &Market) -> Result<BalanceReading> {
        self.balances
            .lock()
            .unwrap()
            .get(&market.url)
            .copied()
            .ok_or_else(|| anyhow!("{} is unreachable", market.url))
    }

    async fn fetch_price(&self, market: &Market) -> Result<PriceReading> {
        self.prices
            .lock()
            .unwrap()
            .get(&market.url)
            .copied()
            .ok_or_else(|| anyhow!("{} is unreachable", market.url))
    }
}

/// Error sink that records failures for assertions.
#[derive(Default)]
pub struct CollectingSink {
    pub errors: Mutex<Vec<(FetchKind, MarketId, String)>>,
}

impl CollectingSink {
    pub fn errors(&self) -> Vec<(FetchKind, MarketId, String)> {
        self.errors.lock().unwrap().clone()
    }
}

impl FetchErrorSink for CollectingSink {
    fn report(&self, kind: FetchKind, market: &Market, error: &AnalyticsError) {
        self.errors
            .lock()
            .unwrap()
            .push((kind, market.id, error.to_string()));
    }
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually<F, Fut>(check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check().await
}
