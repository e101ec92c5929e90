//! Time-series and market-catalog persistence.

mod bucket;
mod jsonl;
mod memory;

pub use jsonl::{JsonMarketCatalog, JsonlTimeSeriesStore};
pub use memory::{MemoryMarketCatalog, MemoryTimeSeriesStore};

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::analytics::vwap;
use crate::models::{
    DiscoveredMarket, Market, MarketBalancePoint, MarketFilter, MarketId, MarketPricePoint, Page,
};
use crate::period::BucketWidth;

/// Range query over the time-series store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub page: Page,
    pub bucket: BucketWidth,
    /// Empty means every market.
    pub market_ids: Vec<MarketId>,
}

impl SeriesQuery {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, bucket: BucketWidth) -> Self {
        Self {
            start,
            end,
            page: Page::unpaginated(),
            bucket,
            market_ids: Vec::new(),
        }
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    pub fn with_markets(mut self, market_ids: impl IntoIterator<Item = MarketId>) -> Self {
        self.market_ids = market_ids.into_iter().collect();
        self
    }

    pub fn includes(&self, market_id: MarketId, ts: DateTime<Utc>) -> bool {
        ts >= self.start
            && ts <= self.end
            && (self.market_ids.is_empty() || self.market_ids.contains(&market_id))
    }
}

/// Append and range-query storage for balance and price samples.
///
/// Points are keyed by market and timestamp; re-inserting the same key is benign.
#[async_trait::async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn insert_balance(&self, point: &MarketBalancePoint) -> Result<()>;
    async fn insert_price(&self, point: &MarketPricePoint) -> Result<()>;

    /// Bucketed, averaged, ascending series per market. Paging applies per series.
    async fn query_balances(
        &self,
        query: &SeriesQuery,
    ) -> Result<HashMap<MarketId, Vec<MarketBalancePoint>>>;

    async fn query_prices(
        &self,
        query: &SeriesQuery,
    ) -> Result<HashMap<MarketId, Vec<MarketPricePoint>>>;

    /// Volume-weighted average quote price across the given markets.
    async fn calculate_vwap(
        &self,
        bucket: BucketWidth,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        market_ids: &[MarketId],
    ) -> Result<Decimal> {
        let query = SeriesQuery::new(start, end, bucket).with_markets(market_ids.iter().copied());
        let prices = self.query_prices(&query).await?;
        let balances = self.query_balances(&query).await?;
        Ok(vwap::vwap(&prices, &balances))
    }
}

/// Result of inserting a discovered market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Market),
    /// A market with the same key exists; treated as success.
    AlreadyPresent(Market),
}

impl InsertOutcome {
    pub fn market(&self) -> &Market {
        match self {
            Self::Inserted(m) | Self::AlreadyPresent(m) => m,
        }
    }
}

/// Relational-style catalog of tracked markets. Markets are never deleted.
#[async_trait::async_trait]
pub trait MarketCatalog: Send + Sync {
    /// Inserts as active. Idempotent on the (url, base, quote) key.
    async fn insert_market(&self, market: &DiscoveredMarket) -> Result<InsertOutcome>;
    async fn all_markets(&self) -> Result<Vec<Market>>;
    async fn markets_by_active(&self, active: bool) -> Result<Vec<Market>>;
    /// Markets matching any of `filters` (all markets when empty), ordered by id.
    async fn markets_for_filter(&self, filters: &[MarketFilter], page: Page)
        -> Result<Vec<Market>>;
    async fn activate_market(&self, id: MarketId) -> Result<()>;
    async fn inactivate_market(&self, id: MarketId) -> Result<()>;
}
