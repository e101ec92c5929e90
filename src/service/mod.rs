//! Query and ingestion services over the stores, the fetcher and the rate client.

mod balances;
mod markets;
mod prices;

pub use balances::{BalanceSample, BalanceService};
pub use markets::MarketService;
pub use prices::{AveragePrice, MarketsPrices, PriceSample, PriceService};

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{Market, MarketId, Page};
use crate::period::{BucketWidth, TimeFrame, TimeRange, Window};

/// Which per-market fetch produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    Balance,
    Price,
}

impl std::fmt::Display for FetchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Balance => f.write_str("balance"),
            Self::Price => f.write_str("price"),
        }
    }
}

/// Receives failures of detached per-market fetch tasks.
pub trait FetchErrorSink: Send + Sync {
    fn report(&self, kind: FetchKind, market: &Market, error: &AnalyticsError);
}

/// Default sink: one `warn` event per failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorSink;

impl FetchErrorSink for LogErrorSink {
    fn report(&self, kind: FetchKind, market: &Market, error: &AnalyticsError) {
        warn!(
            kind = %kind,
            market_id = %market.id,
            url = %market.url,
            error = %error,
            "market fetch failed"
        );
    }
}

/// Spawns detached per-market tasks bounded by a shared semaphore.
#[derive(Clone)]
pub(crate) struct FanOut {
    permits: Arc<Semaphore>,
    sink: Arc<dyn FetchErrorSink>,
}

impl FanOut {
    pub(crate) fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            sink: Arc::new(LogErrorSink),
        }
    }

    pub(crate) fn with_limit(mut self, max_concurrent: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    pub(crate) fn with_sink(mut self, sink: Arc<dyn FetchErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Fires one task per market without awaiting any of them.
    pub(crate) fn dispatch<F, Fut>(&self, kind: FetchKind, markets: Vec<Market>, task: F) -> usize
    where
        F: Fn(Market) -> Fut,
        Fut: Future<Output = AnalyticsResult<()>> + Send + 'static,
    {
        let count = markets.len();
        for market in markets {
            let permits = self.permits.clone();
            let sink = self.sink.clone();
            let fut = task(market.clone());
            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if let Err(err) = fut.await {
                    sink.report(kind, &market, &err);
                }
            });
        }
        debug!(kind = %kind, count, "dispatched market fetches");
        count
    }
}

/// Window, bucket width and store query shared by both series queries.
pub(crate) fn resolve_query(
    range: &TimeRange,
    page: Page,
    frame: TimeFrame,
    now: chrono::DateTime<chrono::Utc>,
) -> AnalyticsResult<(Window, BucketWidth)> {
    page.validate()?;
    let window = range.resolve(now)?;
    Ok((window, frame.bucket_width(&window)))
}

pub(crate) fn require_market_id(market_id: MarketId) -> AnalyticsResult<()> {
    if market_id.value() == 0 {
        return Err(AnalyticsError::invalid("market_id must be set"));
    }
    Ok(())
}
