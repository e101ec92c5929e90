use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::SeriesQuery;
use crate::models::{MarketBalancePoint, MarketId, MarketPricePoint};

#[derive(Default)]
struct Sums {
    first: Decimal,
    second: Decimal,
    count: u32,
}

impl Sums {
    fn add(&mut self, first: Decimal, second: Decimal) {
        self.first += first;
        self.second += second;
        self.count += 1;
    }

    fn mean(&self) -> (Decimal, Decimal) {
        let n = Decimal::from(self.count.max(1));
        (self.first / n, self.second / n)
    }
}

type Buckets = HashMap<MarketId, BTreeMap<DateTime<Utc>, Sums>>;

fn accumulate<'a, T: 'a>(
    points: impl IntoIterator<Item = &'a T>,
    query: &SeriesQuery,
    key: impl Fn(&T) -> (MarketId, DateTime<Utc>),
    values: impl Fn(&T) -> (Decimal, Decimal),
) -> Buckets {
    let mut buckets: Buckets = HashMap::new();
    for point in points {
        let (market_id, ts) = key(point);
        if !query.includes(market_id, ts) {
            continue;
        }
        let (a, b) = values(point);
        buckets
            .entry(market_id)
            .or_default()
            .entry(query.bucket.bucket_start(ts))
            .or_default()
            .add(a, b);
    }
    buckets
}

/// Averages balances into buckets and pages each market's series.
pub(crate) fn bucket_balances<'a>(
    points: impl IntoIterator<Item = &'a MarketBalancePoint>,
    query: &SeriesQuery,
) -> HashMap<MarketId, Vec<MarketBalancePoint>> {
    accumulate(
        points,
        query,
        |p| (p.market_id, p.timestamp),
        |p| (p.base_balance, p.quote_balance),
    )
    .into_iter()
    .map(|(market_id, series)| {
        let series = series
            .into_iter()
            .map(|(timestamp, sums)| {
                let (base_balance, quote_balance) = sums.mean();
                MarketBalancePoint {
                    market_id,
                    base_balance,
                    quote_balance,
                    timestamp,
                }
            })
            .collect();
        (market_id, query.page.apply(series))
    })
    .collect()
}

/// Averages both price legs into buckets and pages each market's series.
pub(crate) fn bucket_prices<'a>(
    points: impl IntoIterator<Item = &'a MarketPricePoint> + Clone,
    query: &SeriesQuery,
) -> HashMap<MarketId, Vec<MarketPricePoint>> {
    let mut pairs: HashMap<MarketId, &MarketPricePoint> = HashMap::new();
    for point in points.clone() {
        pairs.entry(point.market_id).or_insert(point);
    }

    accumulate(
        points,
        query,
        |p| (p.market_id, p.timestamp),
        |p| (p.base_price, p.quote_price),
    )
    .into_iter()
    .filter_map(|(market_id, series)| {
        let template = pairs.get(&market_id)?;
        let series = series
            .into_iter()
            .map(|(timestamp, sums)| {
                let (base_price, quote_price) = sums.mean();
                MarketPricePoint {
                    market_id,
                    base_asset: template.base_asset.clone(),
                    quote_asset: template.quote_asset.clone(),
                    base_price,
                    quote_price,
                    timestamp,
                }
            })
            .collect();
        Some((market_id, query.page.apply(series)))
    })
    .collect()
}
