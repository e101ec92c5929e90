use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::limiter::CallLimiter;
use super::sources::{CryptoRateSource, FiatRateSource, FiatRateTable};
use super::{AssetCurrencies, RateService};
use crate::clock::{Clock, SystemClock};
use crate::config::RatesConfig;
use crate::duration::to_chrono;
use crate::error::RateError;

const BITCOIN_COIN_ID: &str = "bitcoin";

/// Tuning for [`ExchangeRateClient`].
#[derive(Debug, Clone)]
pub struct RateClientOptions {
    pub refresh_interval: Duration,
    pub fiat_refresh_interval: Duration,
    pub calls_per_minute: u32,
    pub burst: u32,
    pub wait_timeout: Duration,
}

impl Default for RateClientOptions {
    fn default() -> Self {
        Self::from(&RatesConfig::default())
    }
}

impl From<&RatesConfig> for RateClientOptions {
    fn from(config: &RatesConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval,
            fiat_refresh_interval: config.fiat_refresh_interval,
            calls_per_minute: config.calls_per_minute,
            burst: config.effective_burst(),
            wait_timeout: config.wait_timeout,
        }
    }
}

#[derive(Debug, Clone)]
struct Timed<T> {
    value: T,
    refreshed_at: DateTime<Utc>,
}

/// Caching, rate-limited adapter over a crypto and a fiat rate source.
///
/// Each cache has its own reader/writer lock plus a refresh mutex, so
/// concurrent misses coalesce into a single upstream call.
pub struct ExchangeRateClient {
    crypto: Arc<dyn CryptoRateSource>,
    fiat: Arc<dyn FiatRateSource>,
    assets: AssetCurrencies,
    fiat_symbols: HashSet<String>,
    limiter: CallLimiter,
    refresh_interval: chrono::Duration,
    fiat_refresh_interval: chrono::Duration,
    clock: Arc<dyn Clock>,

    coins: RwLock<Option<Timed<HashSet<String>>>>,
    coins_refresh: Mutex<()>,

    // (coin id, fiat) -> price of one coin in fiat
    pair_rates: RwLock<HashMap<(String, String), Timed<Decimal>>>,
    pair_refresh: Mutex<()>,

    // fiat code -> table quoted with that code as base
    fiat_tables: RwLock<HashMap<String, Timed<FiatRateTable>>>,
    fiat_refresh: Mutex<()>,
}

impl ExchangeRateClient {
    /// Builds a client and loads the supported fiat symbols once.
    pub async fn connect(
        crypto: Arc<dyn CryptoRateSource>,
        fiat: Arc<dyn FiatRateSource>,
        assets: AssetCurrencies,
        options: RateClientOptions,
    ) -> Result<Self, RateError> {
        let fiat_symbols: HashSet<String> = fiat
            .currencies()
            .await?
            .into_iter()
            .map(|code| code.trim().to_lowercase())
            .collect();
        debug!(
            source = fiat.name(),
            count = fiat_symbols.len(),
            "loaded supported fiat symbols"
        );

        Ok(Self {
            crypto,
            fiat,
            assets,
            fiat_symbols,
            limiter: CallLimiter::per_minute(
                options.calls_per_minute,
                options.burst,
                options.wait_timeout,
            ),
            refresh_interval: to_chrono(options.refresh_interval),
            fiat_refresh_interval: to_chrono(options.fiat_refresh_interval),
            clock: Arc::new(SystemClock),
            coins: RwLock::new(None),
            coins_refresh: Mutex::new(()),
            pair_rates: RwLock::new(HashMap::new()),
            pair_refresh: Mutex::new(()),
            fiat_tables: RwLock::new(HashMap::new()),
            fiat_refresh: Mutex::new(()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn is_fresh(&self, refreshed_at: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.clock.now() - refreshed_at < ttl
    }

    fn fresh_coin_hit(&self, cached: &Option<Timed<HashSet<String>>>, id: &str) -> Option<bool> {
        cached
            .as_ref()
            .filter(|list| self.is_fresh(list.refreshed_at, self.refresh_interval))
            .map(|list| list.value.contains(id))
    }

    /// Whether `id` is a coin the crypto source tracks. Reloads the list when
    /// it was never loaded or has gone stale.
    async fn is_tracked_coin(&self, id: &str) -> Result<bool, RateError> {
        if let Some(hit) = self.fresh_coin_hit(&*self.coins.read().await, id) {
            return Ok(hit);
        }

        let _refresh = self.coins_refresh.lock().await;
        if let Some(hit) = self.fresh_coin_hit(&*self.coins.read().await, id) {
            return Ok(hit);
        }

        self.limiter.acquire().await?;
        let listing = self.crypto.coin_list().await?;
        if listing.is_empty() {
            return Err(RateError::Source(anyhow!(
                "{} returned an empty coin list",
                self.crypto.name()
            )));
        }

        let ids: HashSet<String> = listing.into_iter().map(|c| c.id.to_lowercase()).collect();
        let found = ids.contains(id);
        debug!(source = self.crypto.name(), coins = ids.len(), "reloaded coin list");

        *self.coins.write().await = Some(Timed {
            value: ids,
            refreshed_at: self.clock.now(),
        });
        Ok(found)
    }

    fn fresh_pair(
        &self,
        cached: &HashMap<(String, String), Timed<Decimal>>,
        key: &(String, String),
    ) -> Option<Decimal> {
        cached
            .get(key)
            .filter(|rate| self.is_fresh(rate.refreshed_at, self.refresh_interval))
            .map(|rate| rate.value)
    }

    async fn crypto_to_fiat(&self, coin_id: &str, fiat: &str) -> Result<Decimal, RateError> {
        let key = (coin_id.to_string(), fiat.to_string());
        if let Some(rate) = self.fresh_pair(&*self.pair_rates.read().await, &key) {
            return Ok(rate);
        }

        let _refresh = self.pair_refresh.lock().await;
        if let Some(rate) = self.fresh_pair(&*self.pair_rates.read().await, &key) {
            return Ok(rate);
        }

        self.limiter.acquire().await?;
        let rate = self.crypto.simple_price(coin_id, fiat).await?;
        if rate.is_zero() {
            return Err(RateError::CurrencyNotFound);
        }
        debug!(coin = coin_id, fiat, rate = %rate, "refreshed crypto rate");

        self.pair_rates.write().await.insert(
            key,
            Timed {
                value: rate,
                refreshed_at: self.clock.now(),
            },
        );
        Ok(rate)
    }

    fn lookup_fiat(table: &FiatRateTable, source: &str) -> Result<Decimal, RateError> {
        let per_target = table
            .rates
            .get(&source.to_uppercase())
            .copied()
            .filter(|r| !r.is_zero())
            .ok_or(RateError::CurrencyNotFound)?;
        Ok(Decimal::ONE / per_target)
    }

    async fn fiat_to_fiat(&self, source: &str, target: &str) -> Result<Decimal, RateError> {
        {
            let tables = self.fiat_tables.read().await;
            if let Some(table) = tables
                .get(target)
                .filter(|t| self.is_fresh(t.refreshed_at, self.fiat_refresh_interval))
            {
                return Self::lookup_fiat(&table.value, source);
            }
        }

        let _refresh = self.fiat_refresh.lock().await;
        let stale = {
            let tables = self.fiat_tables.read().await;
            match tables.get(target) {
                Some(t) if self.is_fresh(t.refreshed_at, self.fiat_refresh_interval) => {
                    return Self::lookup_fiat(&t.value, source);
                }
                other => other.cloned(),
            }
        };

        let target_code = target.to_uppercase();
        match self.fiat.latest_rates(&target_code).await {
            Ok(table) if !table.base.eq_ignore_ascii_case(&target_code) => {
                debug!(requested = %target_code, returned = %table.base, "fiat source swapped base");
                Err(RateError::CurrencyNotFound)
            }
            Ok(table) => {
                let rate = Self::lookup_fiat(&table, source);
                self.fiat_tables.write().await.insert(
                    target.to_string(),
                    Timed {
                        value: table,
                        refreshed_at: self.clock.now(),
                    },
                );
                rate
            }
            Err(err) => match stale {
                Some(cached) => {
                    warn!(
                        source = self.fiat.name(),
                        base = %target_code,
                        error = %err,
                        "fiat refresh failed, using stale table"
                    );
                    Self::lookup_fiat(&cached.value, source)
                }
                None => Err(RateError::Source(err)),
            },
        }
    }
}

fn canonical_symbol(symbol: &str) -> String {
    let symbol = symbol.trim().to_lowercase();
    match symbol.as_str() {
        "btc" | "lbtc" => BITCOIN_COIN_ID.to_string(),
        _ => symbol,
    }
}

#[async_trait::async_trait]
impl RateService for ExchangeRateClient {
    async fn convert_currency(&self, source: &str, target: &str) -> Result<Decimal, RateError> {
        let target = target.trim().to_lowercase();
        if source.trim().eq_ignore_ascii_case(&target) {
            return Ok(Decimal::ONE);
        }

        let source = canonical_symbol(source);
        if source == target {
            return Ok(Decimal::ONE);
        }

        if !self.is_fiat_symbol_supported(&target) {
            return Err(RateError::UnsupportedSymbol(target));
        }

        if self.is_tracked_coin(&source).await? {
            self.crypto_to_fiat(&source, &target).await
        } else {
            self.fiat_to_fiat(&source, &target).await
        }
    }

    fn is_fiat_symbol_supported(&self, symbol: &str) -> bool {
        self.fiat_symbols.contains(&symbol.trim().to_lowercase())
    }

    fn asset_currency(&self, asset: &str) -> Result<String, RateError> {
        self.assets.ticker_for(asset).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_aliases_map_to_coin_id() {
        assert_eq!(canonical_symbol("BTC"), "bitcoin");
        assert_eq!(canonical_symbol(" lbtc "), "bitcoin");
        assert_eq!(canonical_symbol("EUR"), "eur");
    }

    #[test]
    fn fiat_lookup_inverts_target_based_table() {
        let table = FiatRateTable {
            base: "EUR".to_string(),
            rates: HashMap::from([("USD".to_string(), Decimal::new(125, 2))]),
        };
        assert_eq!(
            ExchangeRateClient::lookup_fiat(&table, "usd").unwrap(),
            Decimal::new(8, 1)
        );
        assert!(matches!(
            ExchangeRateClient::lookup_fiat(&table, "gbp"),
            Err(RateError::CurrencyNotFound)
        ));
    }
}
