use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use super::{require_market_id, resolve_query, FanOut, FetchErrorSink, FetchKind};
use crate::clock::{Clock, SystemClock};
use crate::error::AnalyticsResult;
use crate::fetcher::MarketDataFetcher;
use crate::models::{Market, MarketBalancePoint, MarketId, Page};
use crate::period::{TimeFrame, TimeRange};
use crate::storage::{MarketCatalog, SeriesQuery, TimeSeriesStore};

const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 16;

/// One bucketed balance as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSample {
    pub base_balance: Decimal,
    pub quote_balance: Decimal,
    pub time: DateTime<Utc>,
}

impl From<MarketBalancePoint> for BalanceSample {
    fn from(point: MarketBalancePoint) -> Self {
        Self {
            base_balance: point.base_balance,
            quote_balance: point.quote_balance,
            time: point.timestamp,
        }
    }
}

/// Balance history queries and the periodic balance fetch.
#[derive(Clone)]
pub struct BalanceService {
    store: Arc<dyn TimeSeriesStore>,
    catalog: Arc<dyn MarketCatalog>,
    fetcher: Arc<dyn MarketDataFetcher>,
    fanout: FanOut,
    clock: Arc<dyn Clock>,
}

impl BalanceService {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        catalog: Arc<dyn MarketCatalog>,
        fetcher: Arc<dyn MarketDataFetcher>,
    ) -> Self {
        Self {
            store,
            catalog,
            fetcher,
            fanout: FanOut::new(DEFAULT_MAX_CONCURRENT_FETCHES),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn FetchErrorSink>) -> Self {
        self.fanout = self.fanout.with_sink(sink);
        self
    }

    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.fanout = self.fanout.with_limit(max);
        self
    }

    /// Bucketed balances per market over the resolved window.
    pub async fn get_balances(
        &self,
        range: &TimeRange,
        page: Page,
        frame: TimeFrame,
        market_ids: &[MarketId],
    ) -> AnalyticsResult<HashMap<MarketId, Vec<BalanceSample>>> {
        let (window, bucket) = resolve_query(range, page, frame, self.clock.now())?;
        let query = SeriesQuery::new(window.start, window.end, bucket)
            .with_page(page)
            .with_markets(market_ids.iter().copied());

        let series = self.store.query_balances(&query).await?;
        debug!(markets = series.len(), bucket = %bucket, "queried balances");

        Ok(series
            .into_iter()
            .map(|(id, points)| (id, points.into_iter().map(BalanceSample::from).collect()))
            .collect())
    }

    pub async fn insert_balance(&self, point: &MarketBalancePoint) -> AnalyticsResult<()> {
        require_market_id(point.market_id)?;
        self.store.insert_balance(point).await?;
        Ok(())
    }

    /// Fetches the market's current reserves and stores them at "now".
    pub async fn fetch_and_store_balance(
        &self,
        market: &Market,
    ) -> AnalyticsResult<MarketBalancePoint> {
        let reading = self.fetcher.fetch_balance(market).await?;
        let point = MarketBalancePoint {
            market_id: market.id,
            base_balance: reading.base_balance,
            quote_balance: reading.quote_balance,
            timestamp: self.clock.now(),
        };
        self.insert_balance(&point).await?;
        Ok(point)
    }

    /// Starts one detached fetch per active market and returns how many were started.
    pub async fn dispatch_balance_fetch(&self) -> AnalyticsResult<usize> {
        let markets = self.catalog.markets_by_active(true).await?;
        info!(markets = markets.len(), "starting balance fetch cycle");

        let count = self.fanout.dispatch(FetchKind::Balance, markets, |market| {
            let this = self.clone();
            async move { this.fetch_and_store_balance(&market).await.map(|_| ()) }
        });
        Ok(count)
    }
}
