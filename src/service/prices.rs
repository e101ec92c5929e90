use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{require_market_id, resolve_query, FanOut, FetchErrorSink, FetchKind};
use crate::analytics::{PriceNormalizer, ReferencePrices};
use crate::clock::{Clock, SystemClock};
use crate::error::{AnalyticsError, AnalyticsResult, RateError};
use crate::fetcher::MarketDataFetcher;
use crate::models::{AssetId, Market, MarketId, MarketPricePoint, Page};
use crate::period::{BucketWidth, TimeFrame, TimeRange, Window};
use crate::rates::RateService;
use crate::storage::{MarketCatalog, SeriesQuery, TimeSeriesStore};

const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 16;

/// One bucketed price with both legs in the reference currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceSample {
    pub base_price: Decimal,
    pub base_reference_price: Decimal,
    pub quote_price: Decimal,
    pub quote_reference_price: Decimal,
    pub time: DateTime<Utc>,
}

impl PriceSample {
    fn new(point: &MarketPricePoint, reference: ReferencePrices) -> Self {
        Self {
            base_price: point.base_price,
            base_reference_price: reference.base,
            quote_price: point.quote_price,
            quote_reference_price: reference.quote,
            time: point.timestamp,
        }
    }
}

/// VWAP across the requested markets that share one asset pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AveragePrice {
    pub market_ids: Vec<MarketId>,
    pub average_price: Decimal,
    pub average_reference_price: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarketsPrices {
    pub prices: HashMap<MarketId, Vec<PriceSample>>,
    pub average_prices: Vec<AveragePrice>,
}

/// Price history queries, normalization and the periodic price fetch.
#[derive(Clone)]
pub struct PriceService {
    store: Arc<dyn TimeSeriesStore>,
    catalog: Arc<dyn MarketCatalog>,
    fetcher: Arc<dyn MarketDataFetcher>,
    rates: Arc<dyn RateService>,
    fanout: FanOut,
    clock: Arc<dyn Clock>,
}

impl PriceService {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        catalog: Arc<dyn MarketCatalog>,
        fetcher: Arc<dyn MarketDataFetcher>,
        rates: Arc<dyn RateService>,
    ) -> Self {
        Self {
            store,
            catalog,
            fetcher,
            rates,
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

    /// Bucketed prices per market, normalized into `reference_currency`.
    ///
    /// An empty reference currency skips normalization and leaves the
    /// reference legs at zero. Average prices are only computed when the
    /// caller names markets explicitly.
    pub async fn get_prices(
        &self,
        range: &TimeRange,
        page: Page,
        reference_currency: &str,
        frame: TimeFrame,
        market_ids: &[MarketId],
    ) -> AnalyticsResult<MarketsPrices> {
        let reference = reference_currency.trim().to_lowercase();
        if !reference.is_empty() && !self.rates.is_fiat_symbol_supported(&reference) {
            return Err(AnalyticsError::invalid(format!(
                "unsupported reference currency {reference_currency:?}"
            )));
        }

        let (window, bucket) = resolve_query(range, page, frame, self.clock.now())?;
        if window.length() <= bucket.as_duration() {
            return Err(AnalyticsError::invalid(format!(
                "time window must be longer than the bucket width {bucket}"
            )));
        }

        let query = SeriesQuery::new(window.start, window.end, bucket)
            .with_page(page)
            .with_markets(market_ids.iter().copied());
        let series = self.store.query_prices(&query).await?;
        debug!(markets = series.len(), bucket = %bucket, reference = %reference, "queried prices");

        let mut normalizer =
            (!reference.is_empty()).then(|| PriceNormalizer::new(self.rates.clone(), &reference));

        let mut prices = HashMap::with_capacity(series.len());
        for (market_id, points) in &series {
            let mut samples = Vec::with_capacity(points.len());
            for point in points {
                let normalized = match normalizer.as_mut() {
                    Some(n) => n.normalize(point).await,
                    None => ReferencePrices::default(),
                };
                samples.push(PriceSample::new(point, normalized));
            }
            prices.insert(*market_id, samples);
        }

        let average_prices = if market_ids.is_empty() {
            Vec::new()
        } else {
            self.average_prices(market_ids, window, bucket, &reference).await?
        };

        Ok(MarketsPrices {
            prices,
            average_prices,
        })
    }

    async fn average_prices(
        &self,
        market_ids: &[MarketId],
        window: Window,
        bucket: BucketWidth,
        reference: &str,
    ) -> AnalyticsResult<Vec<AveragePrice>> {
        // Pairs come from the catalog, not the paged series.
        let named: HashSet<MarketId> = market_ids.iter().copied().collect();
        let mut groups: BTreeMap<(AssetId, AssetId), Vec<MarketId>> = BTreeMap::new();
        for market in self.catalog.all_markets().await? {
            if named.contains(&market.id) {
                groups
                    .entry((market.base_asset, market.quote_asset))
                    .or_default()
                    .push(market.id);
            }
        }

        let mut averages = Vec::with_capacity(groups.len());
        for ((_, quote_asset), mut ids) in groups {
            ids.sort();
            let average_price = self
                .store
                .calculate_vwap(bucket, window.start, window.end, &ids)
                .await?;
            let average_reference_price = if reference.is_empty() {
                Decimal::ZERO
            } else {
                self.reference_value(&quote_asset, average_price, reference)
                    .await
            };
            averages.push(AveragePrice {
                market_ids: ids,
                average_price,
                average_reference_price,
            });
        }
        averages.sort_by(|a, b| a.market_ids.cmp(&b.market_ids));
        Ok(averages)
    }

    /// `amount` of the quote asset expressed in the reference currency; zero when unresolvable.
    async fn reference_value(
        &self,
        quote_asset: &AssetId,
        amount: Decimal,
        reference: &str,
    ) -> Decimal {
        let rate: Result<Decimal, RateError> = async {
            let ticker = self.rates.asset_currency(quote_asset.as_str())?;
            self.rates.convert_currency(&ticker, reference).await
        }
        .await;

        match rate {
            Ok(rate) => {
                (amount * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            }
            Err(err) => {
                warn!(
                    quote_asset = %quote_asset,
                    reference,
                    error = %err,
                    "average reference price unavailable"
                );
                Decimal::ZERO
            }
        }
    }

    pub async fn insert_price(&self, point: &MarketPricePoint) -> AnalyticsResult<()> {
        require_market_id(point.market_id)?;
        for asset in [&point.base_asset, &point.quote_asset] {
            AssetId::parse(asset.as_str()).map_err(|e| AnalyticsError::invalid(e.to_string()))?;
        }
        self.store.insert_price(point).await?;
        Ok(())
    }

    /// Fetches the market's spot price and stores it at "now".
    pub async fn fetch_and_store_price(
        &self,
        market: &Market,
    ) -> AnalyticsResult<MarketPricePoint> {
        let reading = self.fetcher.fetch_price(market).await?;
        let point = MarketPricePoint {
            market_id: market.id,
            base_asset: market.base_asset.clone(),
            quote_asset: market.quote_asset.clone(),
            base_price: reading.base_price,
            quote_price: reading.quote_price,
            timestamp: self.clock.now(),
        };
        self.insert_price(&point).await?;
        Ok(point)
    }

    /// Starts one detached fetch per active market and returns how many were started.
    pub async fn dispatch_price_fetch(&self) -> AnalyticsResult<usize> {
        let markets = self.catalog.markets_by_active(true).await?;
        info!(markets = markets.len(), "starting price fetch cycle");

        let count = self.fanout.dispatch(FetchKind::Price, markets, |market| {
            let this = self.clone();
            async move { this.fetch_and_store_price(&market).await.map(|_| ()) }
        });
        Ok(count)
    }
}
