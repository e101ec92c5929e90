//! In-memory stores for tests and embedding.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::bucket::{bucket_balances, bucket_prices};
use super::{InsertOutcome, MarketCatalog, SeriesQuery, TimeSeriesStore};
use crate::models::{
    DiscoveredMarket, Market, MarketBalancePoint, MarketFilter, MarketId, MarketKey,
    MarketPricePoint, Page,
};

type SeriesKey = (MarketId, DateTime<Utc>);

#[derive(Default)]
pub struct MemoryTimeSeriesStore {
    balances: Mutex<BTreeMap<SeriesKey, MarketBalancePoint>>,
    prices: Mutex<BTreeMap<SeriesKey, MarketPricePoint>>,
}

impl MemoryTimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn balance_count(&self) -> usize {
        self.balances.lock().await.len()
    }

    pub async fn price_count(&self) -> usize {
        self.prices.lock().await.len()
    }
}

#[async_trait::async_trait]
impl TimeSeriesStore for MemoryTimeSeriesStore {
    async fn insert_balance(&self, point: &MarketBalancePoint) -> Result<()> {
        let mut balances = self.balances.lock().await;
        balances.insert((point.market_id, point.timestamp), point.clone());
        Ok(())
    }

    async fn insert_price(&self, point: &MarketPricePoint) -> Result<()> {
        let mut prices = self.prices.lock().await;
        prices.insert((point.market_id, point.timestamp), point.clone());
        Ok(())
    }

    async fn query_balances(
        &self,
        query: &SeriesQuery,
    ) -> Result<HashMap<MarketId, Vec<MarketBalancePoint>>> {
        let balances = self.balances.lock().await;
        Ok(bucket_balances(balances.values(), query))
    }

    async fn query_prices(
        &self,
        query: &SeriesQuery,
    ) -> Result<HashMap<MarketId, Vec<MarketPricePoint>>> {
        let prices = self.prices.lock().await;
        Ok(bucket_prices(prices.values(), query))
    }
}

/// Catalog contents shared by the in-memory and file-backed catalogs.
#[derive(Debug, Clone, Default)]
pub(crate) struct CatalogState {
    markets: BTreeMap<MarketId, Market>,
}

impl CatalogState {
    pub(crate) fn from_markets(markets: impl IntoIterator<Item = Market>) -> Self {
        Self {
            markets: markets.into_iter().map(|m| (m.id, m)).collect(),
        }
    }

    pub(crate) fn markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    fn find_by_key(&self, key: &MarketKey) -> Option<&Market> {
        self.markets.values().find(|m| &m.key() == key)
    }

    fn next_id(&self) -> MarketId {
        let last = self.markets.keys().next_back().map(|id| id.value()).unwrap_or(0);
        MarketId::new(last + 1)
    }

    pub(crate) fn insert(&mut self, market: &DiscoveredMarket) -> InsertOutcome {
        if let Some(existing) = self.find_by_key(&market.key()) {
            return InsertOutcome::AlreadyPresent(existing.clone());
        }
        let stored = Market {
            id: self.next_id(),
            provider_name: market.provider_name.clone(),
            url: market.url.clone(),
            base_asset: market.base_asset.clone(),
            quote_asset: market.quote_asset.clone(),
            active: true,
        };
        self.markets.insert(stored.id, stored.clone());
        InsertOutcome::Inserted(stored)
    }

    /// Returns whether the flag actually changed.
    pub(crate) fn set_active(&mut self, id: MarketId, active: bool) -> Result<bool> {
        let market = self
            .markets
            .get_mut(&id)
            .with_context(|| format!("Market {id} not found"))?;
        let changed = market.active != active;
        market.active = active;
        Ok(changed)
    }

    pub(crate) fn by_active(&self, active: bool) -> Vec<Market> {
        self.markets().filter(|m| m.active == active).cloned().collect()
    }

    pub(crate) fn filtered(&self, filters: &[MarketFilter], page: Page) -> Vec<Market> {
        let matching: Vec<Market> = self
            .markets()
            .filter(|m| filters.is_empty() || filters.iter().any(|f| f.matches(m)))
            .cloned()
            .collect();
        page.apply(matching)
    }
}

#[derive(Default)]
pub struct MemoryMarketCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryMarketCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_markets(markets: impl IntoIterator<Item = Market>) -> Self {
        Self {
            state: Mutex::new(CatalogState::from_markets(markets)),
        }
    }
}

#[async_trait::async_trait]
impl MarketCatalog for MemoryMarketCatalog {
    async fn insert_market(&self, market: &DiscoveredMarket) -> Result<InsertOutcome> {
        Ok(self.state.lock().await.insert(market))
    }

    async fn all_markets(&self) -> Result<Vec<Market>> {
        Ok(self.state.lock().await.markets().cloned().collect())
    }

    async fn markets_by_active(&self, active: bool) -> Result<Vec<Market>> {
        Ok(self.state.lock().await.by_active(active))
    }

    async fn markets_for_filter(
        &self,
        filters: &[MarketFilter],
        page: Page,
    ) -> Result<Vec<Market>> {
        Ok(self.state.lock().await.filtered(filters, page))
    }

    async fn activate_market(&self, id: MarketId) -> Result<()> {
        self.state.lock().await.set_active(id, true).map(|_| ())
    }

    async fn inactivate_market(&self, id: MarketId) -> Result<()> {
        self.state.lock().await.set_active(id, false).map(|_| ())
    }
}
